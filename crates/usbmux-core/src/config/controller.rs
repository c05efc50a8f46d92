//! Device controller configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_secs, string_list};

/// Configuration for the device controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Only handle the device with this serial number
    pub target: Option<String>,

    /// Delay between failed attempts of a custom poll callback
    #[serde(with = "duration_secs")]
    pub poll_retry_delay: Duration,

    /// The per-device action
    pub actions: ActionConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target: None,
            poll_retry_delay: Duration::from_secs(5),
            actions: ActionConfig::default(),
        }
    }
}

/// Candidate per-device actions
///
/// Several fields may be set; the controller runs only the first non-empty
/// one in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Remote command; the first item is the command line, the rest are
    /// written to its stdin one per line
    #[serde(with = "string_list")]
    pub command: Vec<String>,

    /// Package to upload and install
    pub package: Option<PathBuf>,

    /// Local directory, remote directory, then the file names to upload
    #[serde(with = "string_list")]
    pub upload: Vec<String>,

    /// Bundle identifier to launch
    pub run_app: Option<String>,

    /// Application archive to install
    pub install_app: Option<PathBuf>,

    /// Bundle identifier to uninstall
    pub uninstall_app: Option<String>,

    /// Reboot the device
    pub reboot: bool,
}
