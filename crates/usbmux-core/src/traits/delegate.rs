//! Listener callback trait

use usbmux_protocol::DeviceEvent;

use crate::error::EventError;

/// Receives device events from a listener
///
/// Callbacks are invoked synchronously from the listener's driver task, in
/// the order frames arrive on the daemon connection. Implementations should
/// hand long-running work to another task.
pub trait DeviceDelegate: Send + Sync {
    /// A device was attached
    fn device_attached(&self, event: &DeviceEvent);

    /// A device was detached, or its connection was lost
    fn device_detached(&self, event: &DeviceEvent);

    /// A frame could not be handled; `raw` is the offending payload
    fn protocol_error(&self, error: &EventError, raw: &[u8]);
}
