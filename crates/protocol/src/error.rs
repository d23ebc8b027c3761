//! Wire protocol error types

use thiserror::Error;

/// Errors raised by the frame codec and session layer.
///
/// Every variant is fatal for the connection it occurred on: the byte
/// stream is no longer aligned on a frame boundary and must be dropped.
/// USB-level failures are never reported through this type; they travel
/// inside response payloads as a status integer.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame did not start with the codec magic
    #[error("bad frame magic: {found:02x?}")]
    BadMagic { found: [u8; 4] },

    /// Format string in the header does not match the expected schema
    #[error("format mismatch: expected {expected:?}, got {found:?}")]
    FormatMismatch {
        expected: &'static str,
        found: String,
    },

    /// Declared header or payload length exceeds the allowed maximum
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Payload ended before the schema was fully decoded
    #[error("payload exhausted: needed {needed} more bytes")]
    PayloadExhausted { needed: usize },

    /// Payload bytes left over after the schema was fully decoded
    #[error("trailing payload bytes: {remaining}")]
    TrailingBytes { remaining: usize },

    /// Counted array announced a count other than its declared capacity
    #[error("bad array count: expected {expected}, got {found}")]
    BadArrayCount { expected: usize, found: i32 },

    /// Operation selector with no catalog entry
    #[error("unknown operation selector: {0}")]
    UnknownOperation(i32),

    /// I/O error on the underlying stream (includes short reads/writes)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for codec results
pub type Result<T> = std::result::Result<T, WireError>;
