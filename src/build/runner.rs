//! Run one build command under a deadline, capturing and mirroring output.
//!
//! The command line is split on whitespace and executed directly, never
//! through a shell. Output goes to the host terminal as it arrives and into
//! a capped per-stream buffer; the buffers are returned whatever the outcome,
//! so a failed or killed unit still reports what it printed.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use owo_colors::OwoColorize;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{debug, log};

/// Deadline for a single build command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes kept per stream (stdout and stderr each).
pub const CAPTURE_LIMIT: usize = 5 * 1024 * 1024;

/// How long to wait for pipe readers after the process is gone. Grandchildren
/// can keep a pipe open after their parent was killed.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Why a build command did not succeed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("exited with {0}")]
    Exit(ExitStatus),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("failed to wait for process")]
    Io(#[from] io::Error),
}

/// Outcome of one command: captured output plus pass/fail.
#[derive(Debug)]
pub struct CommandResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: Result<(), RunError>,
}

impl CommandResult {
    fn failed(error: RunError) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            status: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }
}

/// Executes build commands. Cheap to clone; one runner serves all units.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    capture_limit: usize,
    mirror: bool,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner {
    pub const fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            capture_limit: CAPTURE_LIMIT,
            mirror: true,
        }
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }

    /// Capture only, without echoing to the terminal.
    pub const fn quiet(mut self) -> Self {
        self.mirror = false;
        self
    }

    /// Run `command_line` in `dir` until it exits, `cancel` fires or the
    /// deadline passes. On cancel or deadline the process is killed.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        dir: &Path,
        command_line: &str,
    ) -> CommandResult {
        let Some((program, args)) = split_command(command_line) else {
            return CommandResult::failed(RunError::EmptyCommand);
        };

        log!("build"; "running {}", command_line.dimmed());
        let started = Instant::now();

        let spawned = Command::new(resolve_program(program))
            .args(&args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                return CommandResult::failed(RunError::Spawn {
                    program: program.to_string(),
                    source,
                });
            }
        };

        let stdout = child
            .stdout
            .take()
            .map(|out| Capture::start(out, Stream::Stdout, self.capture_limit, self.mirror));
        let stderr = child
            .stderr
            .take()
            .map(|err| Capture::start(err, Stream::Stderr, self.capture_limit, self.mirror));

        let status = tokio::select! {
            biased;
            exit = child.wait() => match exit {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(RunError::Exit(status)),
                Err(e) => Err(RunError::Io(e)),
            },
            () = cancel.cancelled() => {
                kill(&mut child).await;
                Err(RunError::Cancelled)
            }
            () = tokio::time::sleep(self.timeout) => {
                kill(&mut child).await;
                Err(RunError::Timeout(self.timeout))
            }
        };

        let stdout = Capture::finish(stdout).await;
        let stderr = Capture::finish(stderr).await;

        match &status {
            Ok(()) => debug!("build"; "`{}` finished in {:?}", command_line, started.elapsed()),
            Err(e) => debug!("build"; "`{}` {} after {:?}", command_line, e, started.elapsed()),
        }

        CommandResult {
            stdout,
            stderr,
            status,
        }
    }
}

/// Split a command line on whitespace into program and arguments.
pub fn split_command(line: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = line.split_whitespace();
    let program = parts.next()?;
    Some((program, parts.collect()))
}

/// Look bare program names up on `PATH` (picks up `.cmd` shims on Windows).
fn resolve_program(program: &str) -> PathBuf {
    if program.contains(['/', '\\']) {
        return PathBuf::from(program);
    }
    which::which(program).unwrap_or_else(|_| PathBuf::from(program))
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("build"; "kill failed: {}", e);
    }
    let _ = child.wait().await;
}

// ============================================================================
// Output capture
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    async fn mirror(self, bytes: &[u8]) {
        let written = match self {
            Self::Stdout => {
                let mut out = tokio::io::stdout();
                out.write_all(bytes).await.and(out.flush().await)
            }
            Self::Stderr => {
                let mut err = tokio::io::stderr();
                err.write_all(bytes).await.and(err.flush().await)
            }
        };
        if written.is_ok() {
            crate::logger::mark_foreign_output();
        }
    }
}

/// A reader task filling a shared buffer, so output read so far survives
/// even when the task has to be aborted.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn start<R>(mut reader: R, stream: Stream, limit: usize, mirror: bool) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                let n = match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                if mirror {
                    stream.mirror(&chunk[..n]).await;
                }
                let mut buf = sink.lock();
                let room = limit.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
        });
        Self { buffer, task }
    }

    async fn finish(capture: Option<Self>) -> Vec<u8> {
        let Some(Self { buffer, mut task }) = capture else {
            return Vec::new();
        };
        if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
            task.abort();
        }
        std::mem::take(&mut *buffer.lock())
    }
}
