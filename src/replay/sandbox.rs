//! Script sandbox capability.
//!
//! A sandbox is one isolated script context. The replay engine creates a
//! fresh one per call through a [`SandboxFactory`] and always terminates it
//! afterwards, so no global state survives between calls.

use std::io;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to start sandbox")]
    Spawn(#[source] io::Error),

    /// The script threw; carries the script-level message.
    #[error("{0}")]
    Script(String),

    #[error("sandbox was terminated")]
    Terminated,

    #[error("sandbox protocol error: {0}")]
    Protocol(String),

    #[error("sandbox I/O failed")]
    Io(#[from] io::Error),
}

/// One isolated script-execution context.
///
/// Implementations must allow [`terminate`](Self::terminate) to be called
/// from another thread while `load` or `call` is running, and must make the
/// running call return promptly with [`SandboxError::Terminated`].
pub trait ScriptSandbox: Send + Sync {
    /// Evaluate `source` in the global scope. `name` is used in stack traces.
    fn load(&self, name: &str, source: &str) -> Result<(), SandboxError>;

    /// Call the function at the dotted global path `entry` with JSON-encoded
    /// arguments. Returns the JSON-encoded return value.
    fn call(&self, entry: &str, args: &[String]) -> Result<String, SandboxError>;

    /// Stop execution and release the context. Idempotent.
    fn terminate(&self);
}

/// Creates fresh sandboxes.
pub trait SandboxFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn ScriptSandbox>, SandboxError>;
}
