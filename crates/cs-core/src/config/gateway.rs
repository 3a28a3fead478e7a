//! Gateway (HTTP server) configuration

use serde::{Deserialize, Serialize};

use super::SessionConfig;
use crate::error::ConfigError;

/// Configuration for the gateway daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Interface to listen on
    pub server_address: String,

    /// Port to listen on
    pub server_port: u16,

    /// Prefix prepended to every route (empty = none)
    pub url_route_prefix: String,

    /// Path of the terminal upgrade endpoint
    pub path_xtermjs: String,

    /// Path of the liveness probe
    pub path_liveness: String,

    /// Path of the readiness probe
    pub path_readiness: String,

    /// Per-session settings
    pub session: SessionConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_address: "0.0.0.0".to_string(),
            server_port: 8261,
            url_route_prefix: String::new(),
            path_xtermjs: "/xterm.js".to_string(),
            path_liveness: "/liveness".to_string(),
            path_readiness: "/readiness".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Get the listen address (address:port)
    pub fn bind_address(&self) -> String {
        if self.server_address.contains(':') && !self.server_address.starts_with('[') {
            format!("[{}]:{}", self.server_address, self.server_port)
        } else {
            format!("{}:{}", self.server_address, self.server_port)
        }
    }

    /// Check the configuration for values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.url_route_prefix;
        if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
            return Err(ConfigError::Invalid(format!(
                "url_route_prefix must start with '/' and not end with one: {:?}",
                prefix
            )));
        }

        for (name, path) in [
            ("path_xtermjs", &self.path_xtermjs),
            ("path_liveness", &self.path_liveness),
            ("path_readiness", &self.path_readiness),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "{} must start with '/': {:?}",
                    name, path
                )));
            }
        }

        if self.path_xtermjs == self.path_liveness
            || self.path_xtermjs == self.path_readiness
            || self.path_liveness == self.path_readiness
        {
            return Err(ConfigError::Invalid(
                "endpoint paths must be distinct".to_string(),
            ));
        }

        self.session.validate()
    }
}
