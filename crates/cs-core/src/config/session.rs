//! Per-session configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;
use crate::traits::CommandSpec;

/// Settings applied to every terminal session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Program to run inside the PTY
    pub command: String,

    /// Arguments passed to `command`
    pub arguments: Vec<String>,

    /// Working directory of the child (None = inherit)
    pub working_dir: Option<PathBuf>,

    /// Hostnames allowed to open a session
    pub allowed_hostnames: Vec<String>,

    /// Consecutive send/protocol failures tolerated before teardown
    pub connection_error_limit: u32,

    /// Time without a pong before the session is closed
    #[serde(with = "duration_secs")]
    pub keepalive_timeout: Duration,

    /// Largest frame payload, and largest PTY read, in bytes
    pub max_buffer_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: "/bin/bash".to_string(),
            arguments: Vec::new(),
            working_dir: None,
            allowed_hostnames: vec!["localhost".to_string()],
            connection_error_limit: 10,
            keepalive_timeout: Duration::from_secs(20),
            max_buffer_bytes: 512,
        }
    }
}

impl SessionConfig {
    /// Longest a single transport send may take before it counts as failed
    pub fn send_timeout(&self) -> Duration {
        (self.keepalive_timeout / 2).max(Duration::from_millis(1))
    }

    /// Build the command line for a new child process
    pub fn command_spec(&self) -> CommandSpec {
        CommandSpec {
            program: self.command.clone(),
            args: self.arguments.clone(),
            working_dir: self.working_dir.clone(),
            env: Vec::new(),
        }
    }

    /// Check the session settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::Invalid("command must not be empty".to_string()));
        }
        if self.connection_error_limit == 0 {
            return Err(ConfigError::Invalid(
                "connection_error_limit must be at least 1".to_string(),
            ));
        }
        if self.keepalive_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "keepalive_timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_buffer_bytes == 0 || self.max_buffer_bytes > u32::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "max_buffer_bytes out of range: {}",
                self.max_buffer_bytes
            )));
        }
        if self.allowed_hostnames.iter().any(|h| h.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "allowed_hostnames must not contain empty entries".to_string(),
            ));
        }
        Ok(())
    }
}
