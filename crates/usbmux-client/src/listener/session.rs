//! One daemon connection in listen mode
//!
//! A session owns the stream and the set of devices attached on it. The set
//! is local to the connection: when the connection ends, every device still
//! in it gets a synthesized `Detached` so consumers never keep a device the
//! daemon can no longer report on.

use std::collections::BTreeMap;
use std::fmt;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use usbmux_core::{DeviceDelegate, EventError, MuxStream};
use usbmux_protocol::message::message_type;
use usbmux_protocol::{DeviceEvent, Envelope, MuxCodec, ProtocolError, RawFrame, ResultAck};

/// Why the read loop stopped
#[derive(Debug)]
pub(crate) enum SessionEnd {
    /// The daemon closed the connection
    Eof,
    /// Reading or framing failed
    Error(ProtocolError),
    /// The listener was closed
    Cancelled,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Eof => write!(f, "connection closed by daemon"),
            SessionEnd::Error(e) => write!(f, "{}", e),
            SessionEnd::Cancelled => write!(f, "listener closed"),
        }
    }
}

pub(crate) struct ListenSession<'a> {
    frames: FramedRead<MuxStream, MuxCodec>,
    delegate: &'a dyn DeviceDelegate,
    attached: BTreeMap<u32, DeviceEvent>,
}

impl<'a> ListenSession<'a> {
    pub(crate) fn new(stream: MuxStream, delegate: &'a dyn DeviceDelegate) -> Self {
        Self {
            frames: FramedRead::new(stream, MuxCodec::new()),
            delegate,
            attached: BTreeMap::new(),
        }
    }

    /// Write the encoded `Listen` request
    pub(crate) async fn send_listen(&mut self, request: &[u8]) -> std::io::Result<()> {
        let stream = self.frames.get_mut();
        stream.write_all(request).await?;
        stream.flush().await
    }

    /// Deliver events until the connection ends or `cancel` fires
    pub(crate) async fn read_events(&mut self, cancel: &CancellationToken) -> SessionEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = self.frames.next() => next,
            };

            match next {
                Some(Ok(frame)) => self.handle_frame(&frame),
                Some(Err(e)) => return SessionEnd::Error(e),
                None => return SessionEnd::Eof,
            }
        }
    }

    pub(crate) fn handle_frame(&mut self, frame: &RawFrame) {
        let envelope: Envelope = match frame.decode() {
            Ok(envelope) => envelope,
            Err(e) => return self.report(EventError::Decode(e), frame),
        };

        match envelope.message_type.as_str() {
            message_type::RESULT => match frame.decode::<ResultAck>() {
                Ok(ack) if ack.number == 0 => tracing::trace!("Listen acknowledged"),
                Ok(ack) => self.report(EventError::IllegalResponse(ack.number), frame),
                Err(e) => self.report(EventError::Decode(e), frame),
            },
            message_type::ATTACHED | message_type::DETACHED => {
                match frame.decode::<DeviceEvent>() {
                    Ok(event) => self.dispatch(event),
                    Err(e) => self.report(EventError::Decode(e), frame),
                }
            }
            other => self.report(EventError::UnknownMessage(other.to_string()), frame),
        }
    }

    fn dispatch(&mut self, event: DeviceEvent) {
        if event.is_attached() {
            tracing::debug!(
                "Attached: session {} serial {}",
                event.device_id,
                event.serial()
            );
            self.attached.insert(event.device_id, event.clone());
            self.delegate.device_attached(&event);
        } else {
            tracing::debug!("Detached: session {}", event.device_id);
            self.delegate.device_detached(&event);
            self.attached.remove(&event.device_id);
        }
    }

    fn report(&self, error: EventError, frame: &RawFrame) {
        tracing::debug!("Protocol error on listen connection: {}", error);
        self.delegate.protocol_error(&error, frame.payload());
    }

    /// Synthesize `Detached` for every device still attached on this
    /// connection, in ascending session order; returns how many fired
    pub(crate) fn reconcile(&mut self) -> usize {
        let lost = std::mem::take(&mut self.attached);
        let count = lost.len();
        for (device_id, attached) in lost {
            let event = DeviceEvent {
                message_type: message_type::DETACHED.to_string(),
                device_id,
                properties: attached.properties,
            };
            self.delegate.device_detached(&event);
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn attached_ids(&self) -> Vec<u32> {
        self.attached.keys().copied().collect()
    }
}
