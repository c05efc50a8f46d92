//! usbmux-protocol: Wire protocol for the usbmux daemon
//!
//! This crate defines the framing used to talk to the local device
//! multiplexing daemon: a 16-byte little-endian header followed by a
//! property-list payload.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod port;

pub use codec::{encode_message, MuxCodec, RawFrame};
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_FRAME_SIZE};
pub use message::{
    ConnectRequest, DeviceEvent, DeviceProperties, Envelope, ListenRequest, ResultAck, ResultCode,
};
pub use port::swap16;
