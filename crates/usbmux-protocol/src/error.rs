//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Length field smaller than the header itself
    #[error("Invalid frame length: {0} bytes")]
    InvalidLength(u32),

    /// Frame exceeds maximum size
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Payload is not a well-formed property list of the expected shape
    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
