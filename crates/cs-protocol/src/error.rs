//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unknown frame kind byte
    #[error("Unknown frame kind: {0:#04x}")]
    UnknownFrameKind(u8),

    /// Declared payload exceeds the configured maximum
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Message ended before the declared length
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Message carries bytes past the declared payload
    #[error("Trailing bytes after frame: {0}")]
    TrailingBytes(usize),

    /// Resize payload is not exactly rows+cols
    #[error("Invalid resize payload: {0} bytes")]
    InvalidResize(usize),

    /// Close reason is not valid UTF-8
    #[error("Invalid close reason: {0}")]
    InvalidCloseReason(#[from] std::str::Utf8Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
