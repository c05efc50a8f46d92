//! Core error types for the usbmux client

use std::path::PathBuf;
use thiserror::Error;
use usbmux_protocol::ProtocolError;

/// Outcome of a failed tunnel request to a device port
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The device detached before the tunnel could be opened (result 2)
    #[error("device has disconnected")]
    DeviceDisconnected,

    /// Nothing is listening on the requested device port (result 3)
    #[error("port you're requesting is unavailable")]
    PortUnavailable,

    /// The daemon rejected the request as malformed (result 5)
    #[error("malformed request received by the device")]
    MalformedRequest,

    /// Any other result code
    #[error("connect refused with result code {code}")]
    Refused { code: i64 },

    /// The daemon answered with something other than a result
    #[error("unexpected message type: {0}")]
    UnexpectedMessage(String),

    /// Port outside 1..=65535
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// Dial network other than the device tunnel
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// The exchange did not complete in time
    #[error("connect timed out")]
    Timeout,

    /// Transport failure
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Framing or payload failure
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors starting a listener
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerError {
    /// `start` was called on a listener that is already running
    #[error("listener already running")]
    AlreadyRunning,

    /// The listener was closed and cannot be restarted
    #[error("listener closed")]
    Closed,
}

/// Protocol-level problems reported through the delegate, never fatal
#[derive(Error, Debug)]
pub enum EventError {
    /// Payload is not a well-formed document of the expected shape
    #[error("decode error: {0}")]
    Decode(#[from] ProtocolError),

    /// Non-zero result on the listen connection
    #[error("illegal response received: result code {0}")]
    IllegalResponse(i64),

    /// Message type the listener does not understand
    #[error("unable to parse the response: message type {0:?}")]
    UnknownMessage(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Daemon endpoint string could not be parsed
    #[error("Invalid daemon endpoint: {0}")]
    InvalidEndpoint(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
