//! Local connection to the daemon

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

use usbmux_core::{DaemonEndpoint, Dial, MuxStream};

/// Opens connections to the daemon's local endpoint
#[derive(Debug, Clone)]
pub struct DaemonDialer {
    endpoint: DaemonEndpoint,
}

impl DaemonDialer {
    /// Create a dialer for the given endpoint
    pub fn new(endpoint: DaemonEndpoint) -> Self {
        Self { endpoint }
    }

    /// The endpoint this dialer connects to
    pub fn endpoint(&self) -> &DaemonEndpoint {
        &self.endpoint
    }

    async fn connect(&self) -> io::Result<MuxStream> {
        match &self.endpoint {
            #[cfg(unix)]
            DaemonEndpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                Ok(Box::new(stream) as MuxStream)
            }
            #[cfg(not(unix))]
            DaemonEndpoint::Unix(path) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("local sockets are not supported here: {}", path.display()),
            )),
            DaemonEndpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream) as MuxStream)
            }
        }
    }
}

#[async_trait]
impl Dial for DaemonDialer {
    async fn dial(&self, timeout: Duration) -> io::Result<MuxStream> {
        tracing::trace!("Dialing daemon at {}", self.endpoint);
        tokio::time::timeout(timeout, self.connect())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connection to {} timed out", self.endpoint),
                )
            })?
    }
}
