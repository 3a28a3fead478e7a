//! Session bridge
//!
//! Pairs one PTY process with one transport connection for the lifetime of
//! a session. Three tasks run while the session is active:
//!
//! - the output pump reads the PTY and sends `Data` frames
//! - the input pump decodes inbound frames and applies them to the PTY
//! - the keepalive timer sends pings and watches for pongs
//!
//! The first task to finish decides why the session drains. Draining
//! cancels the others, terminates the process, sends a final `Close`
//! frame and closes the transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use cs_core::config::SessionConfig;
use cs_core::traits::{
    EventSink, FrameSink, FrameSource, PtyProcess, SessionEvent, Spawner, TracingEventSink,
};
use cs_core::{ProcessError, SessionState, SessionStatus, TransportError};
use cs_protocol::Frame;

use super::keepalive::Keepalive;
use super::registry::{SessionGuard, SessionHandle, SessionRegistry};

/// Upper bound for sending the final `Close` frame and closing the transport
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound for pump tasks to stop after cancellation
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

type SharedSink = Arc<Mutex<Box<dyn FrameSink>>>;

/// Why an active session started draining
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainReason {
    ProcessGone,
    PeerClosed,
    TransportFailed,
    KeepaliveExpired,
    ErrorLimit,
    Shutdown,
}

/// Runs sessions: spawns the process, pumps bytes, tears everything down
pub struct SessionBridge {
    config: Arc<SessionConfig>,
    spawner: Arc<dyn Spawner>,
    registry: Arc<SessionRegistry>,
    events: Arc<dyn EventSink>,
}

impl SessionBridge {
    /// Create a bridge that logs lifecycle events through `tracing`
    pub fn new(
        config: SessionConfig,
        spawner: Arc<dyn Spawner>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            spawner,
            registry,
            events: Arc::new(TracingEventSink),
        }
    }

    /// Replace the event sink
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Session settings
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registry the bridge records sessions in
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Register a session for an admitted request
    ///
    /// Nothing is spawned until [`run`](Self::run); dropping the guard
    /// without running removes the session again.
    pub fn admit(&self) -> SessionGuard {
        self.registry.register(self.config.connection_error_limit)
    }

    /// Drive an admitted session until it is closed
    pub async fn run<S, R>(&self, session: SessionGuard, sink: S, source: R) -> SessionStatus
    where
        S: FrameSink + 'static,
        R: FrameSource + 'static,
    {
        let handle = Arc::clone(session.handle());
        let sink: SharedSink = Arc::new(Mutex::new(Box::new(sink) as Box<dyn FrameSink>));

        let process = match self.spawn(&handle).await {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!(session_id = %handle.id, "Failed to start process: {}", e);
                let status = SessionStatus::SpawnFailed;
                close_transport(&sink, status).await;
                self.transition(&handle, SessionState::Closed);
                self.finish(&handle, status);
                return status;
            }
        };

        handle.set_pid(process.pid());
        self.events
            .record(handle.id, &SessionEvent::Spawned { pid: process.pid() });
        self.transition(&handle, SessionState::Active);

        let pump = Arc::new(Pump {
            handle: Arc::clone(&handle),
            process: Arc::clone(&process),
            sink: Arc::clone(&sink),
            max_payload: self.config.max_buffer_bytes,
            send_timeout: self.config.send_timeout(),
        });
        let (pong_tx, pong_rx) = watch::channel(Instant::now());

        let mut tasks = JoinSet::new();
        tasks.spawn(Arc::clone(&pump).output());
        tasks.spawn(Arc::clone(&pump).input(source, pong_tx));
        tasks.spawn(Arc::clone(&pump).keepalive(self.config.keepalive_timeout, pong_rx));

        let reason = wait_for_drain(&mut tasks, handle.cancel_token()).await;
        tracing::debug!(session_id = %handle.id, ?reason, "Session draining");

        self.transition(&handle, SessionState::Draining);
        handle.cancel_token().cancel();

        let exit_code = {
            let process = Arc::clone(&process);
            match tokio::task::spawn_blocking(move || process.terminate()).await {
                Ok(Ok(code)) => Some(code),
                Ok(Err(e)) => {
                    tracing::warn!(session_id = %handle.id, "Failed to terminate process: {}", e);
                    None
                }
                Err(e) => {
                    tracing::error!(session_id = %handle.id, "Terminate task failed: {}", e);
                    None
                }
            }
        };

        let status = match reason {
            DrainReason::ProcessGone => SessionStatus::ProcessExited(exit_code.unwrap_or(-1)),
            DrainReason::PeerClosed | DrainReason::Shutdown => SessionStatus::NormalExit,
            DrainReason::TransportFailed => SessionStatus::TransportError,
            DrainReason::KeepaliveExpired => SessionStatus::KeepaliveTimeout,
            DrainReason::ErrorLimit => SessionStatus::ErrorLimitExceeded,
        };

        close_transport(&sink, status).await;

        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(session_id = %handle.id, "Session tasks did not stop in time, aborting");
            tasks.abort_all();
        }

        self.transition(&handle, SessionState::Closed);
        self.finish(&handle, status);
        drop(session);
        status
    }

    async fn spawn(&self, handle: &SessionHandle) -> Result<Arc<dyn PtyProcess>, ProcessError> {
        self.transition(handle, SessionState::Spawning);

        let spawner = Arc::clone(&self.spawner);
        let command = self.config.command_spec();
        tracing::info!(
            session_id = %handle.id,
            command = %command.program,
            args = ?command.args,
            "Starting process"
        );

        tokio::task::spawn_blocking(move || spawner.spawn(&command))
            .await
            .map_err(|e| ProcessError::Spawn(format!("spawn task failed: {}", e)))?
    }

    fn transition(&self, handle: &SessionHandle, to: SessionState) {
        if let Some(from) = handle.advance(to) {
            self.events
                .record(handle.id, &SessionEvent::StateChanged { from, to });
        }
    }

    fn finish(&self, handle: &SessionHandle, status: SessionStatus) {
        self.events.record(
            handle.id,
            &SessionEvent::Closed {
                status,
                bytes_in: handle.bytes_in(),
                bytes_out: handle.bytes_out(),
            },
        );
    }
}

/// Wait for the first task to report a reason, or for cancellation
async fn wait_for_drain(
    tasks: &mut JoinSet<Option<DrainReason>>,
    cancel: &CancellationToken,
) -> DrainReason {
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Ok(Some(reason))) => return reason,
                // Task saw cancellation; the other branch fires next
                Some(Ok(None)) => continue,
                Some(Err(e)) => {
                    tracing::error!("Session task failed: {}", e);
                    return DrainReason::TransportFailed;
                }
                None => return DrainReason::Shutdown,
            },
            _ = cancel.cancelled() => return DrainReason::Shutdown,
        }
    }
}

/// Send the final `Close` frame and close the transport, best effort
async fn close_transport(sink: &SharedSink, status: SessionStatus) {
    let message = Frame::Close(status.to_string()).encode();
    let closed = tokio::time::timeout(CLOSE_TIMEOUT, async {
        let mut sink = sink.lock().await;
        if let Err(e) = sink.send(message).await {
            tracing::debug!("Failed to send close frame: {}", e);
        }
        if let Err(e) = sink.close().await {
            tracing::debug!("Failed to close transport: {}", e);
        }
    })
    .await;
    if closed.is_err() {
        tracing::debug!("Timed out closing transport");
    }
}

/// State shared by the three session tasks
struct Pump {
    handle: Arc<SessionHandle>,
    process: Arc<dyn PtyProcess>,
    sink: SharedSink,
    max_payload: usize,
    /// Bound on one send, including the wait for the sink lock
    send_timeout: Duration,
}

impl Pump {
    fn cancel(&self) -> &CancellationToken {
        self.handle.cancel_token()
    }

    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let message = frame.encode();
        let sent = tokio::time::timeout(self.send_timeout, async {
            self.sink.lock().await.send(message).await
        })
        .await;
        sent.unwrap_or_else(|_| {
            Err(TransportError::Send(format!(
                "timed out after {:?}",
                self.send_timeout
            )))
        })
    }

    fn expired(&self, timeout: Duration) -> DrainReason {
        tracing::warn!(
            session_id = %self.handle.id,
            timeout_secs = timeout.as_secs_f64(),
            "No pong within keepalive timeout"
        );
        DrainReason::KeepaliveExpired
    }

    /// Apply a send result to the error budget
    fn account(&self, sent: Result<(), TransportError>, what: &str) -> Option<DrainReason> {
        match sent {
            Ok(()) => {
                self.handle.record_success();
                None
            }
            Err(e) => {
                let exhausted = self.handle.record_failure();
                tracing::warn!(
                    session_id = %self.handle.id,
                    errors = self.handle.consecutive_errors(),
                    "Failed to send {}: {}",
                    what,
                    e
                );
                exhausted.then_some(DrainReason::ErrorLimit)
            }
        }
    }

    /// PTY -> transport
    async fn output(self: Arc<Self>) -> Option<DrainReason> {
        loop {
            let process = Arc::clone(&self.process);
            let limit = self.max_payload;
            let read = tokio::select! {
                _ = self.cancel().cancelled() => return None,
                read = tokio::task::spawn_blocking(move || process.read(limit)) => read,
            };

            let data = match read {
                Ok(Ok(data)) => data,
                Ok(Err(e)) => {
                    tracing::debug!(session_id = %self.handle.id, "PTY closed: {}", e);
                    return Some(DrainReason::ProcessGone);
                }
                Err(e) => {
                    tracing::error!(session_id = %self.handle.id, "PTY read task failed: {}", e);
                    return Some(DrainReason::ProcessGone);
                }
            };
            if data.is_empty() {
                continue;
            }
            self.handle.add_bytes_out(data.len());

            let sent = tokio::select! {
                _ = self.cancel().cancelled() => return None,
                sent = self.send(Frame::Data(data)) => sent,
            };
            if let Some(reason) = self.account(sent, "output") {
                return Some(reason);
            }
        }
    }

    /// Transport -> PTY
    async fn input<R: FrameSource>(
        self: Arc<Self>,
        mut source: R,
        pongs: watch::Sender<Instant>,
    ) -> Option<DrainReason> {
        loop {
            let received = tokio::select! {
                _ = self.cancel().cancelled() => return None,
                received = source.recv() => received,
            };

            let message = match received {
                Ok(Some(message)) => message,
                Ok(None) => {
                    tracing::debug!(session_id = %self.handle.id, "Peer closed the connection");
                    return Some(DrainReason::PeerClosed);
                }
                Err(e) => {
                    tracing::warn!(session_id = %self.handle.id, "Transport receive failed: {}", e);
                    return Some(DrainReason::TransportFailed);
                }
            };

            let frame = match Frame::decode(message, self.max_payload) {
                Ok(frame) => frame,
                Err(e) => {
                    let exhausted = self.handle.record_failure();
                    tracing::warn!(
                        session_id = %self.handle.id,
                        errors = self.handle.consecutive_errors(),
                        "Dropping malformed frame: {}",
                        e
                    );
                    if exhausted {
                        return Some(DrainReason::ErrorLimit);
                    }
                    continue;
                }
            };

            match frame {
                Frame::Data(data) => {
                    if data.is_empty() {
                        self.handle.record_success();
                        continue;
                    }
                    let len = data.len();
                    let process = Arc::clone(&self.process);
                    let written = tokio::select! {
                        _ = self.cancel().cancelled() => return None,
                        written = tokio::task::spawn_blocking(move || process.write(&data)) => written,
                    };
                    match written {
                        Ok(Ok(())) => {
                            self.handle.add_bytes_in(len);
                            self.handle.record_success();
                        }
                        Ok(Err(ProcessError::ProcessGone)) => {
                            tracing::debug!(session_id = %self.handle.id, "PTY closed during write");
                            return Some(DrainReason::ProcessGone);
                        }
                        // The child may still be alive; the frame is lost
                        Ok(Err(e)) => {
                            let exhausted = self.handle.record_failure();
                            tracing::warn!(
                                session_id = %self.handle.id,
                                errors = self.handle.consecutive_errors(),
                                "PTY write failed: {}",
                                e
                            );
                            if exhausted {
                                return Some(DrainReason::ErrorLimit);
                            }
                        }
                        Err(e) => {
                            tracing::error!(session_id = %self.handle.id, "PTY write task failed: {}", e);
                            return Some(DrainReason::ProcessGone);
                        }
                    }
                }
                Frame::Resize(size) => {
                    let process = Arc::clone(&self.process);
                    match tokio::task::spawn_blocking(move || process.resize(size)).await {
                        Ok(Ok(())) => {
                            self.handle.record_success();
                            tracing::debug!(
                                session_id = %self.handle.id,
                                rows = size.rows,
                                cols = size.cols,
                                "Resized terminal"
                            );
                        }
                        Ok(Err(ProcessError::ProcessGone)) => return Some(DrainReason::ProcessGone),
                        Ok(Err(e)) => {
                            tracing::warn!(session_id = %self.handle.id, "Resize failed: {}", e);
                        }
                        Err(e) => {
                            tracing::error!(session_id = %self.handle.id, "Resize task failed: {}", e);
                        }
                    }
                }
                Frame::Ping(payload) => {
                    let sent = tokio::select! {
                        _ = self.cancel().cancelled() => return None,
                        sent = self.send(Frame::Pong(payload)) => sent,
                    };
                    if let Some(reason) = self.account(sent, "pong") {
                        return Some(reason);
                    }
                }
                Frame::Pong(_) => {
                    self.handle.record_success();
                    pongs.send_replace(Instant::now());
                }
                Frame::Close(reason) => {
                    tracing::debug!(session_id = %self.handle.id, %reason, "Peer sent close");
                    return Some(DrainReason::PeerClosed);
                }
            }
        }
    }

    /// Periodic pings and the pong deadline
    async fn keepalive(
        self: Arc<Self>,
        timeout: Duration,
        mut pongs: watch::Receiver<Instant>,
    ) -> Option<DrainReason> {
        let start = Instant::now();
        let mut keepalive = Keepalive::new(timeout, start);
        let mut ticker = tokio::time::interval_at(start + keepalive.interval(), keepalive.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel().cancelled() => return None,
                _ = tokio::time::sleep_until(keepalive.deadline()) => {
                    if deadline_passed(&mut keepalive, &mut pongs) {
                        return Some(self.expired(timeout));
                    }
                }
                changed = pongs.changed() => {
                    if changed.is_err() {
                        // Input pump is gone; it has already reported
                        self.cancel().cancelled().await;
                        return None;
                    }
                    keepalive.pong(*pongs.borrow_and_update());
                }
                _ = ticker.tick() => {
                    let payload = Bytes::copy_from_slice(&keepalive.next_ping_payload());
                    let send = self.send(Frame::Ping(payload));
                    tokio::pin!(send);

                    // A stalled sink must not hold the deadline back
                    let sent = loop {
                        tokio::select! {
                            _ = self.cancel().cancelled() => return None,
                            _ = tokio::time::sleep_until(keepalive.deadline()) => {
                                if deadline_passed(&mut keepalive, &mut pongs) {
                                    return Some(self.expired(timeout));
                                }
                            }
                            sent = &mut send => break sent,
                        }
                    };
                    if let Some(reason) = self.account(sent, "ping") {
                        return Some(reason);
                    }
                }
            }
        }
    }
}

/// Apply any pong not yet seen, then check the deadline
fn deadline_passed(keepalive: &mut Keepalive, pongs: &mut watch::Receiver<Instant>) -> bool {
    keepalive.pong(*pongs.borrow_and_update());
    Instant::now() >= keepalive.deadline()
}
