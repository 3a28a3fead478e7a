//! Session registry

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use cs_core::{SessionId, SessionState};

/// Poll interval while waiting for sessions to drain
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Process-wide bookkeeping of live sessions
///
/// Entries are inserted when a request is admitted and removed when the
/// returned [`SessionGuard`] is dropped, which happens on every exit path.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    /// Parent of every session's cancellation token
    shutdown: CancellationToken,
}

/// Shared, lock-free view of one session
pub struct SessionHandle {
    /// Session ID
    pub id: SessionId,
    /// When the session was admitted
    pub created_at: Instant,
    state: AtomicU8,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    consecutive_errors: AtomicU32,
    error_limit: u32,
    /// Child process id (0 = none yet)
    pid: AtomicU32,
    has_pid: AtomicBool,
    cancel: CancellationToken,
}

/// Point-in-time copy of a session's counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session ID
    pub id: SessionId,
    /// Lifecycle state
    pub state: SessionState,
    /// Child process id
    pub pid: Option<u32>,
    /// Time since admission
    pub age: Duration,
    /// Bytes written to the process
    pub bytes_in: u64,
    /// Bytes read from the process
    pub bytes_out: u64,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a new session in the `Admitted` state
    pub fn register(self: &Arc<Self>, error_limit: u32) -> SessionGuard {
        let handle = Arc::new(SessionHandle {
            id: SessionId::new(),
            created_at: Instant::now(),
            state: AtomicU8::new(SessionState::Admitted.as_u8()),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            consecutive_errors: AtomicU32::new(0),
            error_limit: error_limit.max(1),
            pid: AtomicU32::new(0),
            has_pid: AtomicBool::new(false),
            cancel: self.shutdown.child_token(),
        });
        self.sessions.insert(handle.id, Arc::clone(&handle));
        tracing::debug!(session_id = %handle.id, "Session registered");

        SessionGuard {
            registry: Arc::clone(self),
            handle,
        }
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&id).map(|r| Arc::clone(&r))
    }

    /// List all sessions
    pub fn list(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.iter().map(|r| Arc::clone(&r)).collect()
    }

    /// Snapshot every session's counters
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.sessions.iter().map(|r| r.snapshot()).collect()
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cancel every current and future session
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!(sessions = self.len(), "Shutting down all sessions");
        }
        self.shutdown.cancel();
    }

    /// Check if [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait until every session has been removed, up to `timeout`
    ///
    /// Returns `false` if sessions were still registered at the deadline.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            while !self.is_empty() {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await;
        drained.is_ok()
    }

    fn remove(&self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            tracing::debug!(session_id = %id, "Session removed");
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle {
    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(SessionState::Closed)
    }

    /// Move forward to `to`, returning the previous state
    ///
    /// Returns `None` (and changes nothing) if the session is already at or
    /// past `to`; states never move backwards.
    pub fn advance(&self, to: SessionState) -> Option<SessionState> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= to.as_u8() {
                return None;
            }
            match self.state.compare_exchange(
                current,
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(previous) => return SessionState::from_u8(previous),
                Err(actual) => current = actual,
            }
        }
    }

    /// Token cancelled when this session starts draining or the registry shuts down
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record the child process id
    pub fn set_pid(&self, pid: Option<u32>) {
        if let Some(pid) = pid {
            self.pid.store(pid, Ordering::Release);
            self.has_pid.store(true, Ordering::Release);
        }
    }

    /// Child process id, once spawned
    pub fn pid(&self) -> Option<u32> {
        if self.has_pid.load(Ordering::Acquire) {
            Some(self.pid.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Count bytes written to the process
    pub fn add_bytes_in(&self, n: usize) {
        self.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Count bytes read from the process
    pub fn add_bytes_out(&self, n: usize) {
        self.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Bytes written to the process so far
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    /// Bytes read from the process so far
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    /// Count a failed send or malformed frame
    ///
    /// Returns `true` once the consecutive count reaches the error limit.
    pub fn record_failure(&self) -> bool {
        let count = self.consecutive_errors.fetch_add(1, Ordering::AcqRel) + 1;
        count >= self.error_limit
    }

    /// Reset the consecutive failure count after a successful exchange
    pub fn record_success(&self) {
        self.consecutive_errors.store(0, Ordering::Release);
    }

    /// Current consecutive failure count
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Acquire)
    }

    /// Copy the session's counters
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.state(),
            pid: self.pid(),
            age: self.created_at.elapsed(),
            bytes_in: self.bytes_in(),
            bytes_out: self.bytes_out(),
        }
    }
}

/// Owns a registry entry; removes it when dropped
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    handle: Arc<SessionHandle>,
}

impl SessionGuard {
    /// The registered session
    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    /// Session ID
    pub fn id(&self) -> SessionId {
        self.handle.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Release the pumps if the session never reached Draining
        self.handle.cancel.cancel();
        self.registry.remove(self.handle.id);
    }
}
