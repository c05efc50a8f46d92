//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// Network name accepted by device dial operations
pub const TUNNEL_NETWORK: &str = "device-tunnel";

/// Environment variable overriding the daemon endpoint
pub const ENDPOINT_ENV: &str = "USBMUXD_SOCKET_ADDRESS";

/// Where the daemon listens
///
/// Textual form is `UNIX:/path/to/socket` (a bare absolute path also works)
/// or `host:port` for a loopback TCP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DaemonEndpoint {
    /// Local socket path
    Unix(PathBuf),
    /// TCP address
    Tcp(String),
}

impl DaemonEndpoint {
    /// Platform default endpoint
    pub fn platform_default() -> Self {
        #[cfg(unix)]
        {
            Self::Unix(PathBuf::from("/var/run/usbmuxd"))
        }
        #[cfg(not(unix))]
        {
            Self::Tcp("127.0.0.1:27015".to_string())
        }
    }

    /// Endpoint from `USBMUXD_SOCKET_ADDRESS`, if set
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        match std::env::var(ENDPOINT_ENV) {
            Ok(value) if !value.trim().is_empty() => value.parse().map(Some),
            _ => Ok(None),
        }
    }
}

impl Default for DaemonEndpoint {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl FromStr for DaemonEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("UNIX:") {
            if path.is_empty() {
                return Err(ConfigError::InvalidEndpoint(s.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if s.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(s)));
        }
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Self::Tcp(s.to_string()))
            }
            _ => Err(ConfigError::InvalidEndpoint(s.to_string())),
        }
    }
}

impl TryFrom<String> for DaemonEndpoint {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DaemonEndpoint> for String {
    fn from(endpoint: DaemonEndpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for DaemonEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonEndpoint::Unix(path) => write!(f, "UNIX:{}", path.display()),
            DaemonEndpoint::Tcp(addr) => write!(f, "{}", addr),
        }
    }
}
