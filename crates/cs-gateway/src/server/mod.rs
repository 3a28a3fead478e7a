//! HTTP server
//!
//! Serves the terminal upgrade route and the health probes, and drains
//! every session on shutdown.

mod handler;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::state::GatewayState;

/// How long shutdown waits for sessions to close
pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the gateway router
pub fn router(state: Arc<GatewayState>) -> Router {
    let config = &state.config;
    let route = |path: &str| format!("{}{}", config.url_route_prefix, path);

    Router::new()
        .route(&route(&config.path_xtermjs), get(handler::terminal))
        .route(&route(&config.path_liveness), get(handler::liveness))
        .route(&route(&config.path_readiness), get(handler::readiness))
        .with_state(Arc::clone(&state))
}

/// HTTP server that listens for terminal connections
pub struct GatewayServer {
    /// Shared gateway state
    state: Arc<GatewayState>,
    /// Cancellation token for graceful shutdown
    cancel: CancellationToken,
}

impl GatewayServer {
    /// Create a new server
    pub fn new(state: Arc<GatewayState>, cancel: CancellationToken) -> Self {
        Self { state, cancel }
    }

    /// Bind to `bind_addr` and serve until cancelled
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            "Gateway listening on {} (terminal path {}{})",
            local_addr,
            self.state.config.url_route_prefix,
            self.state.config.path_xtermjs
        );

        let registry = Arc::clone(self.state.registry());
        let cancel = self.cancel.clone();
        let shutdown = async move {
            cancel.cancelled().await;
            tracing::info!("Gateway shutting down");
            registry.shutdown();
        };

        axum::serve(listener, router(Arc::clone(&self.state)))
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server failed")?;

        let registry = self.state.registry();
        registry.shutdown();
        if !registry.wait_idle(SHUTDOWN_DRAIN_TIMEOUT).await {
            tracing::warn!(
                sessions = registry.len(),
                "Sessions still open after shutdown timeout"
            );
        }

        tracing::info!("Gateway stopped");
        Ok(())
    }
}
