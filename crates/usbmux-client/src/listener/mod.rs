//! Persistent listen connection to the daemon
//!
//! A [`MuxListener`] owns one background driver task. The driver dials the
//! daemon, sends `Listen`, and delivers attach/detach events to its delegate
//! until the connection drops, then reconciles and reconnects after a fixed
//! delay. It never gives up on its own; only [`MuxListener::close`] stops it.

mod session;
mod state;

pub use state::RunState;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use usbmux_core::{DeviceDelegate, ListenerError};
use usbmux_protocol::{encode_message, ListenRequest};

use crate::client::MuxClient;
use session::{ListenSession, SessionEnd};
use state::StateCell;

/// Handle to a listen connection and its driver task
///
/// Dropping the handle does not stop a running driver; call
/// [`close`](Self::close).
#[derive(Clone)]
pub struct MuxListener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    client: MuxClient,
    delegate: Arc<dyn DeviceDelegate>,
    state: StateCell,
    cancel: CancellationToken,
}

impl MuxListener {
    pub fn new(client: MuxClient, delegate: Arc<dyn DeviceDelegate>) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                client,
                delegate,
                state: StateCell::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Spawn the driver task
    ///
    /// Only succeeds once per listener. A closed listener cannot be
    /// restarted.
    pub fn start(&self) -> Result<JoinHandle<()>, ListenerError> {
        self.inner.state.start()?;
        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(inner.run()))
    }

    /// Stop the driver
    ///
    /// Wakes a driver blocked in a read, dial or backoff sleep. Devices still
    /// attached on the live connection receive a synthesized `Detached`.
    pub fn close(&self) {
        if self.inner.state.close() != RunState::Closing {
            tracing::info!("Closing listener");
        }
        self.inner.cancel.cancel();
    }

    pub fn state(&self) -> RunState {
        self.inner.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }
}

impl std::fmt::Debug for MuxListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxListener")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ListenerInner {
    async fn run(self: Arc<Self>) {
        let settings = self.client.settings();
        let delay = settings.retry_delay;
        let request = ListenRequest::new(
            settings.prog_name.clone(),
            settings.client_version.clone(),
        );
        let listen_frame = match encode_message(&request) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to encode listen request: {}", e);
                self.state.close();
                return;
            }
        };

        tracing::info!("Listener started");

        while !self.state.is_closing() {
            let dialed = tokio::select! {
                _ = self.cancel.cancelled() => break,
                dialed = self.client.dialer().dial(settings.dial_timeout) => dialed,
            };

            let stream = match dialed {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(
                        "Failed to connect to daemon: {}. Retrying in {:?}",
                        e,
                        delay
                    );
                    self.pause(delay).await;
                    continue;
                }
            };

            let mut session = ListenSession::new(stream, self.delegate.as_ref());
            if let Err(e) = session.send_listen(&listen_frame).await {
                tracing::warn!(
                    "Failed to send listen request: {}. Retrying in {:?}",
                    e,
                    delay
                );
                drop(session);
                self.pause(delay).await;
                continue;
            }

            tracing::info!("Listening for device events");
            let end = session.read_events(&self.cancel).await;
            let lost = session.reconcile();
            drop(session);

            if matches!(end, SessionEnd::Cancelled) || self.state.is_closing() {
                tracing::debug!("Listen connection closed, {} device(s) released", lost);
                break;
            }

            tracing::warn!(
                "Lost daemon connection ({}), {} device(s) detached. Reconnecting in {:?}",
                end,
                lost,
                delay
            );
            self.pause(delay).await;
        }

        tracing::info!("Listener stopped");
    }

    /// Fixed backoff, cut short by close
    async fn pause(&self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}
