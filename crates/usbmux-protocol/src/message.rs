//! Message types for the usbmux protocol
//!
//! Payloads are property-list dictionaries keyed by a `MessageType` string.
//! The client sends `Listen` and `Connect` requests; the daemon answers with
//! `Result` acknowledgments and, on a listening connection, pushes
//! `Attached` and `Detached` events.
//!
//! # Message Flow
//!
//! 1. Client opens a connection and sends `Listen`
//! 2. Daemon responds with `Result { Number: 0 }`
//! 3. Daemon pushes `Attached`/`Detached` for as long as the connection lives
//!
//! A tunnel to a device port uses a separate connection:
//!
//! 1. Client sends `Connect { DeviceID, PortNumber }`
//! 2. Daemon responds with `Result`; on success the connection becomes a raw
//!    byte stream to the device port

use serde::{Deserialize, Serialize};

use crate::port::swap16;

/// `MessageType` values used on the wire
pub mod message_type {
    pub const LISTEN: &str = "Listen";
    pub const CONNECT: &str = "Connect";
    pub const RESULT: &str = "Result";
    pub const ATTACHED: &str = "Attached";
    pub const DETACHED: &str = "Detached";
}

/// Minimal view of any payload, used to dispatch on the message type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "MessageType")]
    pub message_type: String,
}

/// Request to receive attach/detach events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListenRequest {
    pub message_type: String,
    pub client_version_string: String,
    pub prog_name: String,
}

impl ListenRequest {
    /// Create a listen request
    pub fn new(prog_name: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            message_type: message_type::LISTEN.to_string(),
            client_version_string: client_version.into(),
            prog_name: prog_name.into(),
        }
    }
}

/// Request to open a tunnel to a port on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectRequest {
    pub message_type: String,
    pub client_version_string: String,
    pub prog_name: String,
    #[serde(rename = "DeviceID")]
    pub device_id: u32,
    /// Port in the daemon's byte order, see [`swap16`]
    pub port_number: u16,
}

impl ConnectRequest {
    /// Create a connect request for a device port given in host order
    pub fn new(
        prog_name: impl Into<String>,
        client_version: impl Into<String>,
        device_id: u32,
        port: u16,
    ) -> Self {
        Self {
            message_type: message_type::CONNECT.to_string(),
            client_version_string: client_version.into(),
            prog_name: prog_name.into(),
            device_id,
            port_number: swap16(port),
        }
    }

    /// The requested port in host order
    pub fn port(&self) -> u16 {
        swap16(self.port_number)
    }
}

/// Properties reported with an `Attached` event
///
/// `Detached` events usually omit the dictionary, so every field defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProperties {
    #[serde(rename = "ConnectionSpeed")]
    pub connection_speed: u64,
    #[serde(rename = "ConnectionType")]
    pub connection_type: String,
    #[serde(rename = "DeviceID")]
    pub device_id: u32,
    #[serde(rename = "LocationID")]
    pub location_id: u64,
    #[serde(rename = "ProductID")]
    pub product_id: u32,
    #[serde(rename = "SerialNumber")]
    pub serial_number: String,
}

/// Device attach or detach notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    #[serde(rename = "MessageType")]
    pub message_type: String,
    /// Session ID assigned by the daemon for this attach period
    #[serde(rename = "DeviceID")]
    pub device_id: u32,
    #[serde(rename = "Properties", default)]
    pub properties: DeviceProperties,
}

impl DeviceEvent {
    /// Build an `Attached` event
    pub fn attached(device_id: u32, properties: DeviceProperties) -> Self {
        Self {
            message_type: message_type::ATTACHED.to_string(),
            device_id,
            properties,
        }
    }

    /// Build a `Detached` event without properties, as the daemon sends it
    pub fn detached(device_id: u32) -> Self {
        Self {
            message_type: message_type::DETACHED.to_string(),
            device_id,
            properties: DeviceProperties::default(),
        }
    }

    /// Serial number (UDID) of the device, empty if not reported
    pub fn serial(&self) -> &str {
        &self.properties.serial_number
    }

    pub fn is_attached(&self) -> bool {
        self.message_type == message_type::ATTACHED
    }

    pub fn is_detached(&self) -> bool {
        self.message_type == message_type::DETACHED
    }
}

/// Generic acknowledgment carrying a result code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultAck {
    pub message_type: String,
    pub number: i64,
}

impl ResultAck {
    /// Build a `Result` acknowledgment
    pub fn new(number: i64) -> Self {
        Self {
            message_type: message_type::RESULT.to_string(),
            number,
        }
    }

    /// Interpret the numeric result
    pub fn code(&self) -> ResultCode {
        ResultCode::from_number(self.number)
    }
}

/// Result codes of a `Result` acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// Request accepted
    Ok,
    /// Device is no longer attached
    DeviceDisconnected,
    /// Nothing listens on the requested device port
    PortUnavailable,
    /// Request was malformed
    Malformed,
    /// Any other code
    Other(i64),
}

impl ResultCode {
    /// Map a wire number to a result code
    pub fn from_number(number: i64) -> Self {
        match number {
            0 => Self::Ok,
            2 => Self::DeviceDisconnected,
            3 => Self::PortUnavailable,
            5 => Self::Malformed,
            other => Self::Other(other),
        }
    }

    /// The wire number for this code
    pub fn as_number(&self) -> i64 {
        match self {
            Self::Ok => 0,
            Self::DeviceDisconnected => 2,
            Self::PortUnavailable => 3,
            Self::Malformed => 5,
            Self::Other(n) => *n,
        }
    }
}
