//! An attached device
//!
//! A [`Device`] is the identity of one attach period plus a shared plugged
//! flag. Clones share the flag, so a worker holding a clone observes the
//! unplug performed by the controller.

use std::any::Any;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use usbmux_core::config::{SshConfig, ToolsConfig};
use usbmux_core::{ConnectError, MuxStream, NetworkDial, TUNNEL_NETWORK};
use usbmux_protocol::DeviceEvent;

use crate::client::MuxClient;
use crate::ssh::DeviceShell;
use crate::tools::ToolRunner;

/// Opaque value attached to a device by the plug hook
pub type Payload = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
pub struct Device {
    /// Session ID for this attach period
    pub id: u32,
    /// Serial number
    pub udid: String,
    /// USB product ID
    pub product: u32,
    plugged: Arc<AtomicBool>,
    payload: Option<Payload>,
    client: MuxClient,
}

impl Device {
    pub fn new(client: MuxClient, id: u32, udid: impl Into<String>, product: u32) -> Self {
        Self {
            id,
            udid: udid.into(),
            product,
            plugged: Arc::new(AtomicBool::new(true)),
            payload: None,
            client,
        }
    }

    /// Build a plugged device from an `Attached` event
    pub fn from_event(client: MuxClient, event: &DeviceEvent) -> Self {
        Self::new(
            client,
            event.device_id,
            event.serial(),
            event.properties.product_id,
        )
    }

    pub fn is_plugged(&self) -> bool {
        self.plugged.load(Ordering::Acquire)
    }

    /// Mark the device unplugged; polling workers stop at their next check
    pub fn cancel(&self) {
        self.plugged.store(false, Ordering::Release);
    }

    pub fn set_payload<T: Any + Send + Sync>(&mut self, value: T) {
        self.payload = Some(Arc::new(value));
    }

    pub fn payload<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref())
    }

    /// Open a tunnel to `port` on this device
    pub async fn connect(&self, port: u16, timeout: Duration) -> Result<MuxStream, ConnectError> {
        self.client.connect(self.id, port, timeout).await
    }

    /// Dial `address` (a decimal port) on the device-tunnel network
    pub async fn dial(
        &self,
        network: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<MuxStream, ConnectError> {
        if network != TUNNEL_NETWORK {
            return Err(ConnectError::UnsupportedNetwork(network.to_string()));
        }
        let port: u16 = address
            .trim()
            .parse()
            .map_err(|_| ConnectError::InvalidPort(address.to_string()))?;
        self.connect(port, timeout).await
    }

    /// SSH helper tunnelling through this device
    pub fn shell(&self, config: &SshConfig) -> DeviceShell {
        DeviceShell::new(Arc::new(self.clone()), config.clone())
    }

    pub fn tools(&self, config: &ToolsConfig) -> ToolRunner {
        ToolRunner::new(self.udid.clone(), config.clone())
    }

    pub async fn run_app(&self, config: &ToolsConfig, bundle_id: &str) -> anyhow::Result<()> {
        self.tools(config).run_app(bundle_id).await
    }

    pub async fn install_app(&self, config: &ToolsConfig, ipa: &Path) -> anyhow::Result<()> {
        self.tools(config).install_app(ipa).await
    }

    pub async fn uninstall_app(&self, config: &ToolsConfig, bundle_id: &str) -> anyhow::Result<()> {
        self.tools(config).uninstall_app(bundle_id).await
    }

    pub async fn reboot(&self, config: &ToolsConfig) -> anyhow::Result<()> {
        self.tools(config).reboot().await
    }
}

#[async_trait]
impl NetworkDial for Device {
    async fn dial_network(
        &self,
        network: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<MuxStream, ConnectError> {
        self.dial(network, address, timeout).await
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("udid", &self.udid)
            .field("product", &format_args!("{:#06x}", self.product))
            .field("plugged", &self.is_plugged())
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientSettings;
    use std::io;
    use usbmux_core::Dial;
    use usbmux_protocol::DeviceProperties;

    struct Unreachable;

    #[async_trait]
    impl Dial for Unreachable {
        async fn dial(&self, _timeout: Duration) -> io::Result<MuxStream> {
            Err(io::ErrorKind::ConnectionRefused.into())
        }
    }

    fn client() -> MuxClient {
        MuxClient::new(Arc::new(Unreachable), ClientSettings::default())
    }

    #[test]
    fn test_from_event() {
        let event = DeviceEvent::attached(
            7,
            DeviceProperties {
                device_id: 7,
                product_id: 0x1234,
                serial_number: "ABC123".to_string(),
                ..Default::default()
            },
        );
        let device = Device::from_event(client(), &event);
        assert_eq!(device.id, 7);
        assert_eq!(device.udid, "ABC123");
        assert_eq!(device.product, 0x1234);
        assert!(device.is_plugged());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let device = Device::new(client(), 1, "ABC123", 0);
        let worker_copy = device.clone();
        device.cancel();
        assert!(!worker_copy.is_plugged());
    }

    #[test]
    fn test_payload_downcast() {
        let mut device = Device::new(client(), 1, "ABC123", 0);
        assert!(device.payload::<String>().is_none());

        device.set_payload(String::from("slot-4"));
        assert_eq!(device.payload::<String>().map(String::as_str), Some("slot-4"));
        assert!(device.payload::<u32>().is_none());
    }

    #[tokio::test]
    async fn test_dial_validates_network_and_port() {
        let device = Device::new(client(), 1, "ABC123", 0);
        let timeout = Duration::from_secs(1);

        assert!(matches!(
            device.dial("tcp", "22", timeout).await,
            Err(ConnectError::UnsupportedNetwork(n)) if n == "tcp"
        ));
        assert!(matches!(
            device.dial(TUNNEL_NETWORK, "ssh", timeout).await,
            Err(ConnectError::InvalidPort(_))
        ));
        assert!(matches!(
            device.dial(TUNNEL_NETWORK, "70000", timeout).await,
            Err(ConnectError::InvalidPort(_))
        ));
        assert!(matches!(
            device.dial(TUNNEL_NETWORK, "0", timeout).await,
            Err(ConnectError::InvalidPort(_))
        ));
        assert!(matches!(
            device.dial(TUNNEL_NETWORK, "22", timeout).await,
            Err(ConnectError::Transport(_))
        ));
    }
}
