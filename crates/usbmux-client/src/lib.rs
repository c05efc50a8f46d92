//! usbmux-client: Host-side client for the usbmux daemon
//!
//! The client keeps a persistent listen connection to the daemon, turns
//! attach/detach events into a live device registry, and opens raw byte
//! tunnels to ports on attached devices.

pub mod channel;
pub mod client;
pub mod controller;
pub mod device;
pub mod listener;
pub mod ssh;
pub mod tools;
pub mod transport;

pub use client::{ClientSettings, MuxClient};
pub use controller::{ControllerHooks, DeviceAction, DeviceController, DeviceRegistry};
pub use device::Device;
pub use listener::{MuxListener, RunState};
pub use transport::DaemonDialer;
