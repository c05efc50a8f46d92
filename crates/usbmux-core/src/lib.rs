//! usbmux-core: Core abstractions and configuration for the usbmux client
//!
//! This crate provides shared types, traits, error types and configuration
//! structures used by the listener, the device channel and the controller.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConfigError, ConnectError, EventError, ListenerError};
pub use traits::{DaemonIo, Dial, DeviceDelegate, MuxStream, NetworkDial};
pub use types::{DaemonEndpoint, TUNNEL_NETWORK};
