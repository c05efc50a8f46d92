//! Core trait definitions

mod delegate;
mod dial;

pub use delegate::DeviceDelegate;
pub use dial::{DaemonIo, Dial, MuxStream, NetworkDial};
