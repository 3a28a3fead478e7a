//! Tokio codec for byte-stream transports

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, HEADER_SIZE};
use crate::message::Frame;

/// Codec for encoding/decoding frames on a byte stream
///
/// Message-oriented transports (one frame per WebSocket message) use
/// [`Frame::decode`] directly; this codec is for raw streams.
#[derive(Debug)]
pub struct FrameCodec {
    /// Largest payload accepted in either direction
    max_payload: usize,
    /// Current header being decoded (if any)
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec bounded by `max_payload` bytes per frame
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            pending_header: None,
        }
    }

    /// Maximum payload size this codec accepts
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::peek(src)? {
                Some(h) => {
                    src.advance(HEADER_SIZE);
                    h
                }
                None => return Ok(None),
            },
        };

        let payload_len = header.check_limit(self.max_payload)?;

        if src.len() < payload_len {
            // Bounded by max_payload, checked above
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_len).freeze();
        Frame::from_parts(header.kind, payload).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload_len = frame.payload_len();
        if payload_len > self.max_payload {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: self.max_payload,
            });
        }

        frame.encode_into(dst);
        Ok(())
    }
}
