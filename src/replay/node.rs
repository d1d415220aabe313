//! Out-of-process sandbox backed by `node`.
//!
//! Each [`NodeSandbox`] is one `node` process running an embedded worker
//! script. Game code is evaluated inside a fresh `vm` context that only
//! exposes a console; console lines come back on the worker's stderr and
//! are printed with a `[game]` prefix. Terminating kills the process.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, ChildStderr, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::sandbox::{SandboxError, SandboxFactory, ScriptSandbox};
use crate::debug;

const BOOTSTRAP: &str = include_str!("bootstrap.js");

/// Spawns one `node` worker per sandbox.
#[derive(Debug, Clone)]
pub struct NodeSandboxFactory {
    node: PathBuf,
}

impl Default for NodeSandboxFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeSandboxFactory {
    /// Use `node` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("node")
    }

    pub fn with_binary(node: impl Into<PathBuf>) -> Self {
        Self { node: node.into() }
    }

    /// Resolve `node` on `PATH`, if installed.
    pub fn locate() -> Option<Self> {
        which::which("node").ok().map(Self::with_binary)
    }
}

impl SandboxFactory for NodeSandboxFactory {
    fn create(&self) -> Result<Arc<dyn ScriptSandbox>, SandboxError> {
        Ok(Arc::new(NodeSandbox::spawn(&self.node)?))
    }
}

/// A running worker process.
pub struct NodeSandbox {
    child: Mutex<Child>,
    /// Held for a whole request/reply exchange.
    pipes: Mutex<Pipes>,
    terminated: AtomicBool,
}

struct Pipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Request<'a> {
    Load { name: &'a str, source: &'a str },
    Call { entry: &'a str, args: &'a [String] },
}

#[derive(Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl NodeSandbox {
    pub fn spawn(node: &Path) -> Result<Self, SandboxError> {
        let mut child = Command::new(node)
            .args(["--no-warnings", "-e", BOOTSTRAP])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(SandboxError::Spawn)?;

        let (Some(stdin), Some(stdout), stderr) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SandboxError::Protocol("worker pipes unavailable".into()));
        };

        let sandbox = Self {
            child: Mutex::new(child),
            pipes: Mutex::new(Pipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            terminated: AtomicBool::new(false),
        };

        if let Some(stderr) = stderr {
            std::thread::Builder::new()
                .name("sandbox-console".into())
                .spawn(move || forward_console(stderr))
                .map_err(SandboxError::Spawn)?;
        }
        Ok(sandbox)
    }

    fn request(&self, request: &Request<'_>) -> Result<Option<String>, SandboxError> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(SandboxError::Terminated);
        }
        let line = serde_json::to_string(request)
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;

        let mut pipes = self.pipes.lock();
        let written = pipes
            .stdin
            .write_all(line.as_bytes())
            .and_then(|()| pipes.stdin.write_all(b"\n"))
            .and_then(|()| pipes.stdin.flush());
        if let Err(e) = written {
            return Err(self.lost(e));
        }

        let mut reply = String::new();
        match pipes.stdout.read_line(&mut reply) {
            Ok(0) => return Err(self.lost_eof()),
            Ok(_) => {}
            Err(e) => return Err(self.lost(e)),
        }
        drop(pipes);

        let reply: Reply = serde_json::from_str(&reply)
            .map_err(|e| SandboxError::Protocol(format!("bad reply: {e}")))?;
        if reply.ok {
            Ok(reply.value)
        } else {
            Err(SandboxError::Script(
                reply.error.unwrap_or_else(|| "unknown error".into()),
            ))
        }
    }

    fn lost(&self, error: std::io::Error) -> SandboxError {
        if self.terminated.load(Ordering::Acquire) {
            SandboxError::Terminated
        } else {
            SandboxError::Io(error)
        }
    }

    fn lost_eof(&self) -> SandboxError {
        if self.terminated.load(Ordering::Acquire) {
            SandboxError::Terminated
        } else {
            SandboxError::Protocol("worker exited unexpectedly".into())
        }
    }
}

impl ScriptSandbox for NodeSandbox {
    fn load(&self, name: &str, source: &str) -> Result<(), SandboxError> {
        self.request(&Request::Load { name, source }).map(|_| ())
    }

    fn call(&self, entry: &str, args: &[String]) -> Result<String, SandboxError> {
        self.request(&Request::Call { entry, args })?
            .ok_or_else(|| SandboxError::Protocol("call returned no value".into()))
    }

    fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut child = self.child.lock();
        if let Err(e) = child.kill() {
            debug!("replay"; "kill failed: {}", e);
        }
        let _ = child.wait();
    }
}

impl Drop for NodeSandbox {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn forward_console(stderr: ChildStderr) {
    for line in BufReader::new(stderr).lines() {
        match line {
            Ok(line) => crate::logger::game_line(&line),
            Err(_) => break,
        }
    }
}
