//! Wire format error types.

use thiserror::Error;

/// Errors that can occur when decoding datagrams.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Datagram length does not match the fixed packet size.
    #[error("wrong datagram length for {packet}: expected {expected} bytes, got {actual}")]
    WrongLength {
        /// Packet kind.
        packet: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Datagram does not start with the expected magic number.
    #[error("bad magic: expected 0x{expected:08X}, got 0x{actual:08X}")]
    BadMagic {
        /// Expected magic.
        expected: u32,
        /// Magic found in the datagram.
        actual: u32,
    },
}

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;
