//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::controller::ControllerConfig;
use super::serde_utils::duration_secs;
use crate::types::DaemonEndpoint;

/// Configuration for the daemon client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Daemon endpoint (`UNIX:/path` or `host:port`)
    pub endpoint: DaemonEndpoint,

    /// Program name reported in requests
    pub prog_name: String,

    /// Client version reported in requests
    pub client_version: String,

    /// Timeout for opening a daemon connection
    #[serde(with = "duration_secs")]
    pub dial_timeout: Duration,

    /// Fixed delay between listener reconnect attempts
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,

    /// Secure shell settings for device actions
    pub ssh: SshConfig,

    /// External tool settings
    pub tools: ToolsConfig,

    /// Device controller settings
    pub controller: ControllerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DaemonEndpoint::default(),
            prog_name: "usbmux-client".to_string(),
            client_version: "1.0.0".to_string(),
            dial_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(5),
            ssh: SshConfig::default(),
            tools: ToolsConfig::default(),
            controller: ControllerConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Apply `USBMUXD_SOCKET_ADDRESS` if it is set
    pub fn apply_env(&mut self) -> Result<(), crate::error::ConfigError> {
        if let Some(endpoint) = DaemonEndpoint::from_env()? {
            tracing::debug!("Daemon endpoint overridden by environment: {}", endpoint);
            self.endpoint = endpoint;
        }
        Ok(())
    }
}

/// Secure shell credentials and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Username on the device
    pub username: String,

    /// Password on the device
    pub password: String,

    /// Device port the shell server listens on
    pub port: u16,

    /// Timeout for tunnel setup plus handshake
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            password: String::new(),
            port: 22,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Settings for external device-management tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory containing `DeviceSupport/<version>/DeveloperDiskImage.dmg`
    pub support_dir: PathBuf,

    /// Timeout for launching an application
    #[serde(with = "duration_secs")]
    pub run_timeout: Duration,

    /// Timeout for install, uninstall and reboot
    #[serde(with = "duration_secs")]
    pub tool_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let support_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            support_dir,
            run_timeout: Duration::from_secs(40),
            tool_timeout: Duration::from_secs(20),
        }
    }
}
