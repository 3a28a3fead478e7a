//! PTY process manager
//!
//! Production [`Spawner`]/[`PtyProcess`] binding on top of `portable-pty`.

use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use cs_core::traits::{CommandSpec, PtyProcess, Spawner};
use cs_core::ProcessError;
use cs_protocol::TerminalSize;

/// How long a terminated child gets to exit before it is force-killed
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Poll interval while waiting for a child to exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Spawns commands on native pseudo-terminals
#[derive(Debug, Clone)]
pub struct NativeSpawner {
    /// Initial window size
    size: TerminalSize,
}

impl NativeSpawner {
    /// Create a spawner using the default 24x80 window
    pub fn new() -> Self {
        Self {
            size: TerminalSize::default(),
        }
    }
}

impl Default for NativeSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl Spawner for NativeSpawner {
    fn spawn(&self, command: &CommandSpec) -> Result<Arc<dyn PtyProcess>, ProcessError> {
        let process = NativePty::spawn(command, self.size)?;
        Ok(Arc::new(process))
    }
}

/// A child process attached to a native PTY
pub struct NativePty {
    pid: Option<u32>,
    reader: Mutex<Box<dyn Read + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    size: Mutex<TerminalSize>,
    /// Cached exit code once the child has been reaped
    exit_code: Mutex<Option<i32>>,
}

impl NativePty {
    /// Allocate a PTY and start `command` on it
    pub fn spawn(command: &CommandSpec, size: TerminalSize) -> Result<Self, ProcessError> {
        let pair = native_pty_system()
            .openpty(pty_size(size))
            .map_err(|e| ProcessError::Spawn(format!("failed to open PTY: {:#}", e)))?;

        let mut cmd = CommandBuilder::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = &command.working_dir {
            cmd.cwd(dir);
        }
        cmd.env("TERM", "xterm-256color");
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ProcessError::Spawn(format!("{}: {:#}", command.program, e)))?;

        // Only the child may hold the slave side, otherwise reads never see EOF
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ProcessError::Spawn(format!("failed to clone PTY reader: {:#}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ProcessError::Spawn(format!("failed to take PTY writer: {:#}", e)))?;

        let pid = child.process_id();
        tracing::debug!(program = %command.program, ?pid, "Spawned PTY process");

        Ok(Self {
            pid,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            master: Mutex::new(pair.master),
            child: Mutex::new(child),
            size: Mutex::new(size),
            exit_code: Mutex::new(None),
        })
    }

    fn has_exited(&self) -> bool {
        lock(&self.exit_code).is_some()
    }

    /// Reap the child if it has exited, caching the code
    fn try_reap(&self) -> Result<Option<i32>, ProcessError> {
        let mut exit_code = lock(&self.exit_code);
        if let Some(code) = *exit_code {
            return Ok(Some(code));
        }
        let status = lock(&self.child).try_wait()?;
        if let Some(status) = status {
            let code = status.exit_code() as i32;
            *exit_code = Some(code);
            return Ok(Some(code));
        }
        Ok(None)
    }

    fn poll_exit(&self, timeout: Duration) -> Result<Option<i32>, ProcessError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(code) = self.try_reap()? {
                return Ok(Some(code));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    #[cfg(unix)]
    fn signal_terminate(&self) {
        if let Some(pid) = self.pid {
            // SAFETY: plain kill(2) on a pid we spawned and have not reaped yet
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                tracing::debug!(pid, "SIGTERM failed: {}", std::io::Error::last_os_error());
            }
        }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&self) {}
}

impl PtyProcess for NativePty {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn read(&self, limit: usize) -> Result<Bytes, ProcessError> {
        let mut buf = vec![0u8; limit.max(1)];
        let mut reader = lock(&self.reader);
        loop {
            match reader.read(&mut buf) {
                Ok(0) => return Err(ProcessError::ProcessGone),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Bytes::from(buf));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // Linux reports EIO on the master once the slave side is gone
                Err(e) if is_closed_pty(&e) => return Err(ProcessError::ProcessGone),
                Err(e) => return Err(ProcessError::Io(e)),
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<(), ProcessError> {
        if self.has_exited() {
            return Err(ProcessError::ProcessGone);
        }
        let mut writer = lock(&self.writer);
        writer
            .write_all(data)
            .and_then(|_| writer.flush())
            .map_err(|e| {
                if is_closed_pty(&e) {
                    ProcessError::ProcessGone
                } else {
                    ProcessError::Io(e)
                }
            })
    }

    fn resize(&self, size: TerminalSize) -> Result<(), ProcessError> {
        if self.has_exited() {
            return Err(ProcessError::ProcessGone);
        }
        let mut current = lock(&self.size);
        if *current == size {
            return Ok(());
        }
        lock(&self.master).resize(pty_size(size)).map_err(|e| {
            ProcessError::Io(std::io::Error::new(ErrorKind::Other, format!("{:#}", e)))
        })?;
        *current = size;
        Ok(())
    }

    fn terminate(&self) -> Result<i32, ProcessError> {
        if let Some(code) = self.try_reap()? {
            return Ok(code);
        }

        self.signal_terminate();
        if let Some(code) = self.poll_exit(TERMINATE_GRACE)? {
            return Ok(code);
        }

        tracing::debug!(pid = ?self.pid, "Process ignored SIGTERM, killing");
        let mut exit_code = lock(&self.exit_code);
        if let Some(code) = *exit_code {
            return Ok(code);
        }
        let mut child = lock(&self.child);
        if let Err(e) = child.kill() {
            tracing::debug!(pid = ?self.pid, "Kill failed: {}", e);
        }
        let code = child.wait()?.exit_code() as i32;
        *exit_code = Some(code);
        Ok(code)
    }

    fn wait(&self) -> Result<i32, ProcessError> {
        loop {
            if let Some(code) = self.try_reap()? {
                return Ok(code);
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

impl std::fmt::Debug for NativePty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativePty")
            .field("pid", &self.pid)
            .field("exit_code", &*lock(&self.exit_code))
            .finish()
    }
}

fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn is_closed_pty(e: &std::io::Error) -> bool {
    is_eio(e) || e.kind() == ErrorKind::BrokenPipe
}

#[cfg(unix)]
fn is_eio(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EIO)
}

#[cfg(not(unix))]
fn is_eio(_e: &std::io::Error) -> bool {
    false
}

/// Lock a mutex, recovering the data if a holder panicked
fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn command(program: &str, args: &[&str]) -> CommandSpec {
        CommandSpec {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn read_all(process: &dyn PtyProcess) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            match process.read(512) {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(ProcessError::ProcessGone) => return out,
                Err(e) => panic!("unexpected read error: {}", e),
            }
        }
    }

    #[test]
    fn test_echo_output_then_process_gone() {
        let process = NativeSpawner::new()
            .spawn(&command("/bin/echo", &["hi"]))
            .unwrap();
        assert!(process.pid().is_some());

        let output = read_all(process.as_ref());
        assert!(String::from_utf8_lossy(&output).contains("hi"));
        assert_eq!(process.wait().unwrap(), 0);
        assert_eq!(process.terminate().unwrap(), 0);
    }

    #[test]
    fn test_term_is_set() {
        let process = NativeSpawner::new()
            .spawn(&command("/bin/sh", &["-c", "echo $TERM"]))
            .unwrap();
        let output = read_all(process.as_ref());
        assert!(String::from_utf8_lossy(&output).contains("xterm-256color"));
    }

    #[test]
    fn test_exit_code_reported() {
        let process = NativeSpawner::new()
            .spawn(&command("/bin/sh", &["-c", "exit 3"]))
            .unwrap();
        assert_eq!(process.wait().unwrap(), 3);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let process = NativeSpawner::new()
            .spawn(&command("/bin/sleep", &["30"]))
            .unwrap();
        let first = process.terminate().unwrap();
        let second = process.terminate().unwrap();
        assert_eq!(first, second);

        assert!(matches!(
            process.write(b"x"),
            Err(ProcessError::ProcessGone)
        ));
        assert!(matches!(
            process.resize(TerminalSize::new(30, 100)),
            Err(ProcessError::ProcessGone)
        ));
    }

    #[test]
    fn test_resize_running_process() {
        let process = NativeSpawner::new()
            .spawn(&command("/bin/sleep", &["30"]))
            .unwrap();
        process.resize(TerminalSize::new(40, 120)).unwrap();
        process.resize(TerminalSize::new(40, 120)).unwrap();
        process.terminate().unwrap();
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        let result = NativeSpawner::new().spawn(&command("/nonexistent/shell", &[]));
        assert!(matches!(result, Err(ProcessError::Spawn(_))));
    }
}
