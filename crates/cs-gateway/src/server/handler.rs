//! HTTP request handlers

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use cs_protocol::HEADER_SIZE;

use super::ws;
use crate::state::GatewayState;

/// Largest WebSocket message accepted before frame decoding
///
/// Frames over the configured payload limit still reach the decoder (and
/// count against the error budget) as long as they fit in this bound.
const MAX_WS_MESSAGE: usize = 64 * 1024;

/// Terminal upgrade endpoint
///
/// The gate runs before the upgrade is accepted, so a denied request never
/// creates a session or a process.
pub async fn terminal(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());

    if let Err(denied) = state.gate.admit(host, origin) {
        tracing::warn!(host = %denied.host, "Rejected connection from disallowed host");
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }

    let Some(upgrade) = upgrade else {
        return (StatusCode::UPGRADE_REQUIRED, "websocket upgrade required").into_response();
    };

    let session = state.bridge.admit();
    tracing::info!(session_id = %session.id(), host = ?host, "Connection admitted");

    let bridge = Arc::clone(&state.bridge);
    let max_message = (HEADER_SIZE + bridge.config().max_buffer_bytes).max(MAX_WS_MESSAGE);
    upgrade
        .max_message_size(max_message)
        .on_failed_upgrade(|e| tracing::warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| async move {
            let (sink, source) = ws::split(socket);
            let id = session.id();
            let status = bridge.run(session, sink, source).await;
            tracing::info!(session_id = %id, %status, "Connection finished");
        })
}

/// Liveness probe
pub async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe; fails once shutdown has begun
pub async fn readiness(State(state): State<Arc<GatewayState>>) -> Response {
    if state.registry().is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response()
    } else {
        (StatusCode::OK, "ok").into_response()
    }
}
