//! Session lifecycle events

use crate::types::{SessionId, SessionState, SessionStatus};

/// A lifecycle event emitted by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session moved between states
    StateChanged {
        /// Previous state
        from: SessionState,
        /// New state
        to: SessionState,
    },
    /// The child process started
    Spawned {
        /// OS process id
        pid: Option<u32>,
    },
    /// The session finished
    Closed {
        /// Final status
        status: SessionStatus,
        /// Bytes written to the process
        bytes_in: u64,
        /// Bytes read from the process
        bytes_out: u64,
    },
}

/// Receives session lifecycle events
pub trait EventSink: Send + Sync {
    /// Record one event for `session`
    fn record(&self, session: SessionId, event: &SessionEvent);
}

/// Event sink that writes events to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, session: SessionId, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged { from, to } => {
                tracing::debug!(session_id = %session, %from, %to, "Session state changed");
            }
            SessionEvent::Spawned { pid } => {
                tracing::info!(session_id = %session, ?pid, "Process started");
            }
            SessionEvent::Closed {
                status,
                bytes_in,
                bytes_out,
            } => {
                tracing::info!(
                    session_id = %session,
                    %status,
                    bytes_in,
                    bytes_out,
                    "Session closed"
                );
            }
        }
    }
}
