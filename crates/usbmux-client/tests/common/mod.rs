//! In-memory daemon and recording delegate shared by the integration tests

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use serde::Serialize;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

use usbmux_client::{ClientSettings, MuxClient};
use usbmux_core::{DeviceDelegate, Dial, EventError, MuxStream};
use usbmux_protocol::{
    encode_message, DeviceEvent, DeviceProperties, FrameHeader, MuxCodec, RawFrame,
};

/// Ordered record of dials and delegate callbacks
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Hands the daemon side of every dialed connection to the test
pub struct MockDaemon {
    log: EventLog,
    failures: AtomicUsize,
    dials: AtomicUsize,
    accept_tx: mpsc::UnboundedSender<DuplexStream>,
}

impl MockDaemon {
    pub fn new(log: EventLog) -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let daemon = Arc::new(Self {
            log,
            failures: AtomicUsize::new(0),
            dials: AtomicUsize::new(0),
            accept_tx,
        });
        (daemon, accept_rx)
    }

    /// Refuse the next `count` dials
    pub fn refuse_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dial for MockDaemon {
    async fn dial(&self, _timeout: Duration) -> io::Result<MuxStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.log.push("dial");

        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }

        let (client, server) = duplex(64 * 1024);
        let _ = self.accept_tx.send(server);
        Ok(Box::new(client))
    }
}

/// Delegate that logs every callback and forwards it to the test
pub struct Recorder {
    log: EventLog,
    tx: mpsc::UnboundedSender<String>,
    raw: Mutex<Vec<Vec<u8>>>,
}

impl Recorder {
    pub fn new(log: EventLog) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Self {
            log,
            tx,
            raw: Mutex::new(Vec::new()),
        });
        (recorder, rx)
    }

    pub fn raw_payloads(&self) -> Vec<Vec<u8>> {
        self.raw.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.push(entry.clone());
        let _ = self.tx.send(entry);
    }
}

impl DeviceDelegate for Recorder {
    fn device_attached(&self, event: &DeviceEvent) {
        self.record(format!("attach {} {}", event.device_id, event.serial()));
    }

    fn device_detached(&self, event: &DeviceEvent) {
        self.record(format!("detach {} {}", event.device_id, event.serial()));
    }

    fn protocol_error(&self, error: &EventError, raw: &[u8]) {
        self.raw.lock().unwrap().push(raw.to_vec());
        self.record(match error {
            EventError::Decode(_) => "error decode".to_string(),
            EventError::IllegalResponse(code) => format!("error illegal {}", code),
            EventError::UnknownMessage(kind) => format!("error unknown {}", kind),
        });
    }
}

pub fn fast_settings() -> ClientSettings {
    ClientSettings {
        prog_name: "usbmux-test".to_string(),
        client_version: "9.9.9".to_string(),
        dial_timeout: Duration::from_secs(1),
        retry_delay: Duration::from_millis(20),
    }
}

pub fn client(daemon: &Arc<MockDaemon>) -> MuxClient {
    MuxClient::new(daemon.clone(), fast_settings())
}

pub fn attached(id: u32, serial: &str, product: u32) -> DeviceEvent {
    DeviceEvent::attached(
        id,
        DeviceProperties {
            connection_speed: 480_000_000,
            connection_type: "USB".to_string(),
            device_id: id,
            location_id: 0,
            product_id: product,
            serial_number: serial.to_string(),
        },
    )
}

/// Read one frame from the daemon side of a connection
pub async fn read_frame(stream: &mut DuplexStream) -> io::Result<RawFrame> {
    let mut buf = BytesMut::zeroed(4);
    stream.read_exact(&mut buf[..]).await?;
    let length = FrameHeader::peek_length(&buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidData))?;
    buf.resize(length, 0);
    stream.read_exact(&mut buf[4..]).await?;
    MuxCodec::new()
        .decode(&mut buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidData))
}

pub async fn send<T: Serialize>(stream: &mut DuplexStream, message: &T) {
    stream
        .write_all(&encode_message(message).unwrap())
        .await
        .unwrap();
}

/// Accept the next connection within a second
pub async fn accept(rx: &mut mpsc::UnboundedReceiver<DuplexStream>) -> DuplexStream {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no connection dialed")
        .expect("daemon dropped")
}

/// Next delegate callback within a second
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no event delivered")
        .expect("recorder dropped")
}
