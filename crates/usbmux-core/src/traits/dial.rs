//! Transport traits

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ConnectError;

/// A bidirectional byte stream to the daemon
pub trait DaemonIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> DaemonIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Boxed daemon stream, returned by every [`Dial`] implementation
pub type MuxStream = Box<dyn DaemonIo>;

/// Opens fresh connections to the daemon
///
/// Every call must return an independent connection: the listener keeps one
/// for its lifetime and each device tunnel consumes one of its own.
#[async_trait]
pub trait Dial: Send + Sync {
    /// Open a new connection, giving up after `timeout`
    async fn dial(&self, timeout: Duration) -> io::Result<MuxStream>;
}

/// Dials a named network address, the way a generic network client would
///
/// Devices implement this for the device-tunnel network, so upper layers such
/// as a secure-shell client can tunnel through a device port instead of a
/// socket address.
#[async_trait]
pub trait NetworkDial: Send + Sync {
    /// Open a stream to `address` on `network`, giving up after `timeout`
    async fn dial_network(
        &self,
        network: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<MuxStream, ConnectError>;
}
