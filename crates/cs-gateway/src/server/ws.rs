//! WebSocket transport adapter
//!
//! One binary message carries one encoded frame. Text messages carry
//! keystrokes from xterm.js and are wrapped into `Data` frames.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use cs_core::traits::{FrameSink, FrameSource};
use cs_core::TransportError;
use cs_protocol::Frame;

/// Outbound half of an upgraded WebSocket
pub struct WsFrameSink {
    inner: SplitSink<WebSocket, Message>,
}

/// Inbound half of an upgraded WebSocket
pub struct WsFrameSource {
    inner: SplitStream<WebSocket>,
}

/// Split an upgraded socket into frame sink and source
pub fn split(socket: WebSocket) -> (WsFrameSink, WsFrameSource) {
    let (sink, stream) = socket.split();
    (WsFrameSink { inner: sink }, WsFrameSource { inner: stream })
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send(&mut self, message: Bytes) -> Result<(), TransportError> {
        self.inner
            .send(Message::Binary(message.to_vec()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            let message = match self.inner.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
                None => return Ok(None),
            };
            match message {
                Message::Binary(data) => return Ok(Some(Bytes::from(data))),
                Message::Text(text) => return Ok(Some(Frame::Data(Bytes::from(text)).encode())),
                Message::Close(_) => return Ok(None),
                // Protocol-level pings are answered by the WebSocket layer
                Message::Ping(_) | Message::Pong(_) => continue,
            }
        }
    }
}
