//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a terminal session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a fresh random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle state
///
/// Transitions only move forward:
/// `Admitted -> Spawning -> Active -> Draining -> Closed`,
/// with `Spawning -> Closed` when the spawn fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionState {
    /// Gate passed, no process yet
    Admitted = 0,
    /// Spawn in flight
    Spawning = 1,
    /// Pumps and keepalive running
    Active = 2,
    /// Tearing down
    Draining = 3,
    /// Terminal; resources released
    Closed = 4,
}

impl SessionState {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Admitted),
            1 => Some(Self::Spawning),
            2 => Some(Self::Active),
            3 => Some(Self::Draining),
            4 => Some(Self::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Admitted => write!(f, "admitted"),
            SessionState::Spawning => write!(f, "spawning"),
            SessionState::Active => write!(f, "active"),
            SessionState::Draining => write!(f, "draining"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Final status of a closed session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Peer closed the session (or the server shut down)
    NormalExit,
    /// The child process ended with this exit code
    ProcessExited(i32),
    /// The transport failed
    TransportError,
    /// No pong within the keepalive timeout
    KeepaliveTimeout,
    /// Too many consecutive send/protocol failures
    ErrorLimitExceeded,
    /// The process could not be started
    SpawnFailed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::NormalExit => write!(f, "session closed"),
            SessionStatus::ProcessExited(code) => write!(f, "process exited with code {}", code),
            SessionStatus::TransportError => write!(f, "transport error"),
            SessionStatus::KeepaliveTimeout => write!(f, "keepalive timeout"),
            SessionStatus::ErrorLimitExceeded => write!(f, "connection error limit exceeded"),
            SessionStatus::SpawnFailed => write!(f, "failed to start process"),
        }
    }
}
