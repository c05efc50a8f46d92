//! Frame header encoding/decoding
//!
//! The frame format uses a 16-byte header of four little-endian u32 fields:
//! - length: total frame length, header included (16 + payload length)
//! - version: payload encoding (1 = property list)
//! - request: request kind (always 8 for property-list messages)
//! - tag: correlation tag (fixed, no request multiplexing)

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 16;

/// Maximum accepted frame size, header included
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Header version for property-list payloads
pub const PLIST_VERSION: u32 = 1;

/// Request kind for property-list messages
pub const PLIST_REQUEST: u32 = 8;

/// Correlation tag sent on every frame
pub const DEFAULT_TAG: u32 = 1;

/// Frame header containing length and protocol information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total length of the frame, header included
    pub length: u32,
    /// Payload encoding version
    pub version: u32,
    /// Request kind
    pub request: u32,
    /// Correlation tag
    pub tag: u32,
}

impl FrameHeader {
    /// Create a header for a property-list payload of the given length
    pub fn new(payload_length: usize) -> Self {
        Self {
            length: (HEADER_SIZE + payload_length) as u32,
            version: PLIST_VERSION,
            request: PLIST_REQUEST,
            tag: DEFAULT_TAG,
        }
    }

    /// Length of the payload following the header
    pub fn payload_length(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_SIZE)
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32_le(self.length);
        dst.put_u32_le(self.version);
        dst.put_u32_le(self.request);
        dst.put_u32_le(self.tag);
    }

    /// Read the total frame length from the 4-byte prefix without consuming it
    ///
    /// Returns None if fewer than 4 bytes are buffered.
    /// Returns Err if the length cannot describe a valid frame.
    pub fn peek_length(src: &[u8]) -> Result<Option<usize>, ProtocolError> {
        if src.len() < 4 {
            return Ok(None);
        }

        let length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        if (length as usize) < HEADER_SIZE {
            return Err(ProtocolError::InvalidLength(length));
        }
        if length as usize > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: length as usize,
                max: MAX_FRAME_SIZE,
            });
        }

        Ok(Some(length as usize))
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }
        if Self::peek_length(src)?.is_none() {
            return Ok(None);
        }

        Ok(Some(Self {
            length: src.get_u32_le(),
            version: src.get_u32_le(),
            request: src.get_u32_le(),
            tag: src.get_u32_le(),
        }))
    }
}
