//! Shared handle to the daemon

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use usbmux_core::config::ClientConfig;
use usbmux_core::{ConnectError, DeviceDelegate, Dial, MuxStream};
use usbmux_protocol::ConnectRequest;

use crate::channel;
use crate::listener::MuxListener;
use crate::transport::DaemonDialer;

/// Identity and timing used for every daemon exchange
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Program name reported in requests
    pub prog_name: String,
    /// Client version reported in requests
    pub client_version: String,
    /// Timeout for opening a daemon connection
    pub dial_timeout: Duration,
    /// Fixed delay between listener reconnect attempts
    pub retry_delay: Duration,
}

impl From<&ClientConfig> for ClientSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            prog_name: config.prog_name.clone(),
            client_version: config.client_version.clone(),
            dial_timeout: config.dial_timeout,
            retry_delay: config.retry_delay,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

/// Cloneable handle for talking to the daemon
///
/// Holds the transport and the request identity. Listeners and device
/// tunnels each open their own connection through it.
#[derive(Clone)]
pub struct MuxClient {
    dialer: Arc<dyn Dial>,
    settings: Arc<ClientSettings>,
}

impl MuxClient {
    /// Create a client over any transport
    pub fn new(dialer: Arc<dyn Dial>, settings: ClientSettings) -> Self {
        Self {
            dialer,
            settings: Arc::new(settings),
        }
    }

    /// Create a client for the endpoint and settings in `config`
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            Arc::new(DaemonDialer::new(config.endpoint.clone())),
            ClientSettings::from(config),
        )
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn dialer(&self) -> &Arc<dyn Dial> {
        &self.dialer
    }

    /// Create a listener delivering events to `delegate`; call
    /// [`MuxListener::start`] to begin listening
    pub fn listener(&self, delegate: Arc<dyn DeviceDelegate>) -> MuxListener {
        MuxListener::new(self.clone(), delegate)
    }

    /// Open a tunnel to `port` on the device with session ID `device_id`
    ///
    /// The whole exchange, dial included, is bounded by `timeout`.
    pub async fn connect(
        &self,
        device_id: u32,
        port: u16,
        timeout: Duration,
    ) -> Result<MuxStream, ConnectError> {
        if port == 0 {
            return Err(ConnectError::InvalidPort(port.to_string()));
        }

        let request = ConnectRequest::new(
            self.settings.prog_name.clone(),
            self.settings.client_version.clone(),
            device_id,
            port,
        );

        let exchange = async {
            let stream = self.dialer.dial(timeout).await?;
            channel::open_tunnel(stream, &request).await
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ConnectError::Timeout)?
    }
}

impl fmt::Debug for MuxClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxClient")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
