//! Transport traits

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Outbound half of a message-oriented connection
#[async_trait]
pub trait FrameSink: Send {
    /// Send one encoded frame as a single binary message
    async fn send(&mut self, message: Bytes) -> Result<(), TransportError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a message-oriented connection
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next message
    ///
    /// Returns `None` once the peer has closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;
}
