//! Frame header encoding/decoding
//!
//! The frame format uses a 5-byte header:
//! - kind: 1 byte (u8)
//! - payload_length: 4 bytes (u32, big-endian)

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::message::FrameKind;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 5;

/// Frame header describing the payload that follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Kind of frame
    pub kind: FrameKind,
    /// Declared length of the payload in bytes
    pub payload_length: u32,
}

impl FrameHeader {
    /// Create a new frame header
    pub fn new(kind: FrameKind, payload_length: u32) -> Self {
        Self {
            kind,
            payload_length,
        }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(self.kind.as_u8());
        dst.put_u32(self.payload_length);
    }

    /// Parse a header from the front of `src` without consuming it
    ///
    /// Returns None if there aren't enough bytes in the buffer.
    /// Returns Err if the kind byte is unknown.
    pub fn peek(src: &[u8]) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let kind = FrameKind::from_u8(src[0]).ok_or(ProtocolError::UnknownFrameKind(src[0]))?;
        let payload_length = u32::from_be_bytes([src[1], src[2], src[3], src[4]]);

        Ok(Some(Self {
            kind,
            payload_length,
        }))
    }

    /// Reject headers whose declared length exceeds `max`
    pub fn check_limit(&self, max: usize) -> Result<usize, ProtocolError> {
        let size = self.payload_length as usize;
        if size > max {
            return Err(ProtocolError::FrameTooLarge { size, max });
        }
        Ok(size)
    }
}
