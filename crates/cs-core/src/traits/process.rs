//! Process traits

use bytes::Bytes;
use cs_protocol::TerminalSize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::ProcessError;

/// Command line for a session's child process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory (None = inherit)
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

/// A child process attached to a pseudo-terminal
///
/// All methods block; async callers run them on the blocking pool.
/// Methods take `&self` so the reader and writer can run on separate
/// threads against one shared handle.
pub trait PtyProcess: Send + Sync {
    /// OS process id, if known
    fn pid(&self) -> Option<u32>;

    /// Read up to `limit` bytes of output
    ///
    /// Blocks until output is available. Buffered output is returned
    /// before [`ProcessError::ProcessGone`] is reported.
    fn read(&self, limit: usize) -> Result<Bytes, ProcessError>;

    /// Write all of `data` to the terminal input
    fn write(&self, data: &[u8]) -> Result<(), ProcessError>;

    /// Change the window size; a no-op when unchanged
    fn resize(&self, size: TerminalSize) -> Result<(), ProcessError>;

    /// Stop the process and reap it, returning its exit code
    ///
    /// Idempotent: later calls return the first call's result.
    fn terminate(&self) -> Result<i32, ProcessError>;

    /// Block until the process exits, returning its exit code
    fn wait(&self) -> Result<i32, ProcessError>;
}

/// Starts child processes on fresh pseudo-terminals
pub trait Spawner: Send + Sync {
    /// Spawn `command` with the default window size
    fn spawn(&self, command: &CommandSpec) -> Result<Arc<dyn PtyProcess>, ProcessError>;
}
