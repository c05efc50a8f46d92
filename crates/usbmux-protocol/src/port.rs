//! Port number transform
//!
//! The daemon expects the `PortNumber` field of a connect request in network
//! byte order, read back as a host integer. On the little-endian hosts the
//! daemon runs on, that is the byte-swapped port.

/// Swap the two bytes of a 16-bit port number.
pub fn swap16(port: u16) -> u16 {
    port.swap_bytes()
}
