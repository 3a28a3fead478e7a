//! Shared gateway state

use std::sync::Arc;

use cs_core::config::GatewayConfig;
use cs_core::traits::{EventSink, Spawner};

use crate::gate::HostAllowlist;
use crate::session::{SessionBridge, SessionRegistry};

/// State shared by every request handler
pub struct GatewayState {
    /// Configuration
    pub config: GatewayConfig,
    /// Connection gate
    pub gate: HostAllowlist,
    /// Session bridge (owns the registry)
    pub bridge: Arc<SessionBridge>,
}

impl GatewayState {
    /// Create gateway state around a process spawner
    pub fn new(config: GatewayConfig, spawner: Arc<dyn Spawner>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let bridge = SessionBridge::new(config.session.clone(), spawner, registry);
        Self::with_bridge(config, bridge)
    }

    /// Create gateway state that reports session events to `events`
    pub fn with_events(
        config: GatewayConfig,
        spawner: Arc<dyn Spawner>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let bridge =
            SessionBridge::new(config.session.clone(), spawner, registry).with_events(events);
        Self::with_bridge(config, bridge)
    }

    fn with_bridge(config: GatewayConfig, bridge: SessionBridge) -> Self {
        Self {
            gate: HostAllowlist::new(&config.session.allowed_hostnames),
            config,
            bridge: Arc::new(bridge),
        }
    }

    /// Get the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.bridge.registry()
    }
}
