//! Scripted process and transport doubles for session tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use cs_core::config::SessionConfig;
use cs_core::traits::{
    CommandSpec, EventSink, FrameSink, FrameSource, PtyProcess, SessionEvent, Spawner,
};
use cs_core::{ProcessError, SessionId, TransportError};
use cs_protocol::{Frame, TerminalSize};

/// Output scripted for a fake process
pub enum Chunk {
    Data(Bytes),
    Exit,
}

/// A process whose output is fed by the test
pub struct FakeProcess {
    output: Mutex<std_mpsc::Receiver<Chunk>>,
    feed: Mutex<std_mpsc::Sender<Chunk>>,
    exited: AtomicBool,
    exit_code: i32,
    pub written: Mutex<Vec<u8>>,
    pub resizes: Mutex<Vec<TerminalSize>>,
    pub terminations: AtomicUsize,
    /// Number of upcoming writes that fail with an I/O error
    pub failing_writes: AtomicUsize,
}

impl FakeProcess {
    pub fn new(exit_code: i32) -> Arc<Self> {
        let (tx, rx) = std_mpsc::channel();
        Arc::new(Self {
            output: Mutex::new(rx),
            feed: Mutex::new(tx),
            exited: AtomicBool::new(false),
            exit_code,
            written: Mutex::new(Vec::new()),
            resizes: Mutex::new(Vec::new()),
            terminations: AtomicUsize::new(0),
            failing_writes: AtomicUsize::new(0),
        })
    }

    /// Queue output for the next read
    pub fn emit(&self, data: &[u8]) {
        let _ = self
            .feed
            .lock()
            .unwrap()
            .send(Chunk::Data(Bytes::copy_from_slice(data)));
    }

    /// Make the process exit after any queued output
    pub fn exit(&self) {
        let _ = self.feed.lock().unwrap().send(Chunk::Exit);
    }

    /// Make the next `n` writes fail while the process stays alive
    pub fn fail_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl PtyProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn read(&self, _limit: usize) -> Result<Bytes, ProcessError> {
        if self.exited.load(Ordering::SeqCst) {
            return Err(ProcessError::ProcessGone);
        }
        match self.output.lock().unwrap().recv() {
            Ok(Chunk::Data(data)) => Ok(data),
            Ok(Chunk::Exit) | Err(_) => {
                self.exited.store(true, Ordering::SeqCst);
                Err(ProcessError::ProcessGone)
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<(), ProcessError> {
        if self.exited.load(Ordering::SeqCst) {
            return Err(ProcessError::ProcessGone);
        }
        let failing = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ProcessError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "pty buffer full",
            )));
        }
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn resize(&self, size: TerminalSize) -> Result<(), ProcessError> {
        self.resizes.lock().unwrap().push(size);
        Ok(())
    }

    fn terminate(&self) -> Result<i32, ProcessError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.exited.store(true, Ordering::SeqCst);
        // Unblock a pending read
        let _ = self.feed.lock().unwrap().send(Chunk::Exit);
        Ok(self.exit_code)
    }

    fn wait(&self) -> Result<i32, ProcessError> {
        while !self.exited.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(self.exit_code)
    }
}

/// Hands out one prepared process, or fails
pub struct FakeSpawner {
    process: Option<Arc<FakeProcess>>,
    spawns: AtomicUsize,
}

impl FakeSpawner {
    pub fn with_process(process: Arc<FakeProcess>) -> Arc<Self> {
        Arc::new(Self {
            process: Some(process),
            spawns: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            process: None,
            spawns: AtomicUsize::new(0),
        })
    }

    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, command: &CommandSpec) -> Result<Arc<dyn PtyProcess>, ProcessError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        match &self.process {
            Some(process) => Ok(Arc::clone(process) as Arc<dyn PtyProcess>),
            None => Err(ProcessError::Spawn(format!(
                "{}: no such file or directory",
                command.program
            ))),
        }
    }
}

/// Records sent frames; fails sends according to a script
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<Frame>>>,
    /// `false` entries fail the corresponding send; empty = succeed
    script: Arc<Mutex<VecDeque<bool>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(outcomes: &[bool]) -> Self {
        let sink = Self::default();
        sink.script.lock().unwrap().extend(outcomes.iter().copied());
        sink
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.sent.lock().unwrap().clone()
    }

    pub fn data(&self) -> Vec<u8> {
        self.frames()
            .into_iter()
            .filter_map(|f| match f {
                Frame::Data(data) => Some(data.to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn close_reason(&self) -> Option<String> {
        self.frames().into_iter().find_map(|f| match f {
            Frame::Close(reason) => Some(reason),
            _ => None,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send(&mut self, message: Bytes) -> Result<(), TransportError> {
        let succeed = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if !succeed {
            return Err(TransportError::Send("scripted failure".into()));
        }
        let frame = Frame::decode(message, usize::MAX).expect("bridge sent an invalid frame");
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A peer that stopped reading: every send waits forever
#[derive(Clone, Default)]
pub struct StalledSink {
    attempts: Arc<AtomicUsize>,
}

impl StalledSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSink for StalledSink {
    async fn send(&mut self, _message: Bytes) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        futures::future::pending().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        futures::future::pending().await
    }
}

/// Inbound messages pushed by the test
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Result<Bytes, TransportError>>,
}

/// Test-side handle for a [`ChannelSource`]
#[derive(Clone)]
pub struct Peer {
    tx: mpsc::UnboundedSender<Result<Bytes, TransportError>>,
}

impl Peer {
    pub fn send(&self, frame: Frame) {
        let _ = self.tx.send(Ok(frame.encode()));
    }

    pub fn send_raw(&self, message: &'static [u8]) {
        let _ = self.tx.send(Ok(Bytes::from_static(message)));
    }

    pub fn fail(&self) {
        let _ = self.tx.send(Err(TransportError::Receive("connection reset".into())));
    }
}

pub fn channel_source() -> (Peer, ChannelSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Peer { tx }, ChannelSource { rx })
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Collects every lifecycle event
#[derive(Default)]
pub struct RecordingEvents {
    pub events: Mutex<Vec<(SessionId, SessionEvent)>>,
}

impl RecordingEvents {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }
}

impl EventSink for RecordingEvents {
    fn record(&self, session: SessionId, event: &SessionEvent) {
        self.events.lock().unwrap().push((session, event.clone()));
    }
}

/// Session settings with keepalive effectively disabled
pub fn quiet_config() -> SessionConfig {
    SessionConfig {
        command: "/bin/fake-shell".to_string(),
        keepalive_timeout: Duration::from_secs(3600),
        ..Default::default()
    }
}
