//! Tokio codec for framed daemon messages
//!
//! The codec only splits the byte stream into frames. Turning a payload into
//! a message shape is a separate step ([`RawFrame::decode`]) so that a
//! malformed payload can be reported without losing stream synchronisation.

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, HEADER_SIZE, MAX_FRAME_SIZE};

/// A complete frame as read from the daemon
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Decoded header
    pub header: FrameHeader,
    /// The whole frame, header included
    pub bytes: Bytes,
}

impl RawFrame {
    /// The property-list payload following the header
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..]
    }

    /// Deserialize the payload into the expected message shape
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(plist::from_bytes(self.payload())?)
    }

    /// Payload rendered as text, for diagnostics
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(self.payload()).into_owned()
    }
}

/// Codec for encoding/decoding daemon frames
#[derive(Debug, Default, Clone, Copy)]
pub struct MuxCodec;

impl MuxCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for MuxCodec {
    type Item = RawFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let length = match FrameHeader::peek_length(src)? {
            Some(length) => length,
            None => return Ok(None), // Need more data
        };

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(length);
        let bytes = frame.clone().freeze();
        let header = match FrameHeader::decode(&mut frame)? {
            Some(header) => header,
            None => return Err(ProtocolError::InvalidLength(length as u32)),
        };

        tracing::trace!(
            length = header.length,
            version = header.version,
            request = header.request,
            tag = header.tag,
            "Decoded frame"
        );

        Ok(Some(RawFrame { header, bytes }))
    }
}

impl<T: Serialize> Encoder<&T> for MuxCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: &T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // Serialize the message
        let mut payload = Vec::new();
        plist::to_writer_xml(&mut payload, message)?;

        let size = HEADER_SIZE + payload.len();
        if size > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }

        FrameHeader::new(payload.len()).encode(dst);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}

/// Encode a message into a complete frame ready to be written
pub fn encode_message<T: Serialize>(message: &T) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    MuxCodec::new().encode(message, &mut buf)?;
    Ok(buf.freeze())
}
