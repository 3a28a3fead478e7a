//! Frame types for the cloudshell protocol
//!
//! A frame is one discrete message exchanged between the browser terminal
//! and the gateway. Each transport message carries exactly one frame.
//!
//! # Message Flow
//!
//! 1. Client connects; the gateway spawns the shell
//! 2. Terminal I/O: `Data` frames flow in both directions
//! 3. Window resize: `Resize` from the client
//! 4. Gateway sends `Ping` periodically, client answers with `Pong`
//! 5. Session end: `Close` carrying a human-readable reason

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, HEADER_SIZE};

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    pub cols: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Default terminal size (24x80)
    pub fn default_size() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::default_size()
    }
}

/// Frame kind identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Terminal data
    Data = 0x01,
    /// Window resize (client to server)
    Resize = 0x02,
    /// Liveness probe
    Ping = 0x03,
    /// Liveness probe answer
    Pong = 0x04,
    /// Session end
    Close = 0x05,
}

impl FrameKind {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Data),
            0x02 => Some(Self::Resize),
            0x03 => Some(Self::Ping),
            0x04 => Some(Self::Pong),
            0x05 => Some(Self::Close),
            _ => None,
        }
    }
}

/// Protocol frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw terminal bytes
    Data(Bytes),
    /// New window size
    Resize(TerminalSize),
    /// Liveness probe with opaque payload
    Ping(Bytes),
    /// Echo of a ping payload
    Pong(Bytes),
    /// Close with reason
    Close(String),
}

impl Frame {
    /// Get the kind of this frame
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Data(_) => FrameKind::Data,
            Frame::Resize(_) => FrameKind::Resize,
            Frame::Ping(_) => FrameKind::Ping,
            Frame::Pong(_) => FrameKind::Pong,
            Frame::Close(_) => FrameKind::Close,
        }
    }

    /// Length of the encoded payload (without header)
    pub fn payload_len(&self) -> usize {
        match self {
            Frame::Data(b) | Frame::Ping(b) | Frame::Pong(b) => b.len(),
            Frame::Resize(_) => 4,
            Frame::Close(reason) => reason.len(),
        }
    }

    /// Append the encoded frame to `dst`
    pub fn encode_into(&self, dst: &mut BytesMut) {
        let header = FrameHeader::new(self.kind(), self.payload_len() as u32);
        dst.reserve(HEADER_SIZE + self.payload_len());
        header.encode(dst);

        match self {
            Frame::Data(b) | Frame::Ping(b) | Frame::Pong(b) => dst.extend_from_slice(b),
            Frame::Resize(size) => {
                dst.put_u16(size.rows);
                dst.put_u16(size.cols);
            }
            Frame::Close(reason) => dst.extend_from_slice(reason.as_bytes()),
        }
    }

    /// Encode the frame into a standalone message
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Decode exactly one frame from a complete transport message
    ///
    /// The declared length is checked against `max_payload` before the
    /// payload is touched, so an oversized header never causes allocation.
    pub fn decode(message: Bytes, max_payload: usize) -> Result<Self, ProtocolError> {
        let header = FrameHeader::peek(&message)?.ok_or(ProtocolError::Truncated {
            expected: HEADER_SIZE,
            actual: message.len(),
        })?;
        let len = header.check_limit(max_payload)?;

        let body = message.len() - HEADER_SIZE;
        if body < len {
            return Err(ProtocolError::Truncated {
                expected: HEADER_SIZE + len,
                actual: message.len(),
            });
        }
        if body > len {
            return Err(ProtocolError::TrailingBytes(body - len));
        }

        Self::from_parts(header.kind, message.slice(HEADER_SIZE..))
    }

    /// Build a frame from its kind and raw payload
    pub fn from_parts(kind: FrameKind, mut payload: Bytes) -> Result<Self, ProtocolError> {
        let frame = match kind {
            FrameKind::Data => Frame::Data(payload),
            FrameKind::Ping => Frame::Ping(payload),
            FrameKind::Pong => Frame::Pong(payload),
            FrameKind::Resize => {
                if payload.len() != 4 {
                    return Err(ProtocolError::InvalidResize(payload.len()));
                }
                let rows = payload.get_u16();
                let cols = payload.get_u16();
                Frame::Resize(TerminalSize::new(rows, cols))
            }
            FrameKind::Close => Frame::Close(std::str::from_utf8(&payload)?.to_string()),
        };
        Ok(frame)
    }
}
