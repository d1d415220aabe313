//! Deterministic replay of recorded moves against the compiled Game bundle.
//!
//! Every call reads the bundle from disk, creates a fresh sandbox, runs it
//! on a dedicated worker thread and tears the sandbox down afterwards:
//!
//! ```text
//! reprocess(setup, moves)
//!   ├── read bundle (never cached, it may have just been rebuilt)
//!   ├── factory.create() ──► sandbox
//!   ├── worker: load game.js → unwrap `game.default` → game.reprocessHistory(setup, moves)
//!   ├── wait ≤ timeout ──── timeout: terminate, Err(Timeout)
//!   └── terminate, parse {initialState, updates}
//! ```

mod node;
mod sandbox;
mod save;
mod types;

pub use node::NodeSandboxFactory;
pub use sandbox::{SandboxError, SandboxFactory, ScriptSandbox};
pub use save::reprocess_save_state;
pub use types::{
    HistoryItem, InitialStateHistoryItem, Move, Player, ReprocessResponse, SaveStateData,
    SetupState,
};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::RecvTimeoutError;
use thiserror::Error;

use crate::{debug, log};

/// Wall-clock bound for one replay call.
pub const REPLAY_TIMEOUT: Duration = Duration::from_secs(30);

/// esbuild's IIFE output assigns the module object to a global `game`.
const UNWRAP_DEFAULT: &str = "if (game.default) { game = game.default }";
const ENTRY_POINT: &str = "game.reprocessHistory";

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay took longer than {0:?}")]
    Timeout(Duration),

    /// The game code failed to load, threw, or reported an error.
    #[error("{0}")]
    Sandbox(String),

    #[error("failed to read game bundle `{}`", path.display())]
    Bundle {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unexpected replay result: {0}")]
    Protocol(String),

    #[error("invalid replay JSON")]
    Json(#[from] serde_json::Error),
}

/// Runs `reprocessHistory` from the bundle at a fixed path.
#[derive(Clone)]
pub struct ReplayEngine {
    bundle: PathBuf,
    timeout: Duration,
    sandboxes: Arc<dyn SandboxFactory>,
}

impl ReplayEngine {
    pub fn new(bundle: impl Into<PathBuf>) -> Self {
        Self {
            bundle: bundle.into(),
            timeout: REPLAY_TIMEOUT,
            sandboxes: Arc::new(NodeSandboxFactory::new()),
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn SandboxFactory>) -> Self {
        self.sandboxes = factory;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn bundle(&self) -> &Path {
        &self.bundle
    }

    /// Replay `moves` from `setup`; returns the initial state and one state per move.
    pub fn reprocess(
        &self,
        setup: &SetupState,
        moves: &[Move],
    ) -> Result<ReprocessResponse, ReplayError> {
        let source = fs::read_to_string(&self.bundle).map_err(|source| ReplayError::Bundle {
            path: self.bundle.clone(),
            source,
        })?;
        let args = vec![serde_json::to_string(setup)?, serde_json::to_string(moves)?];

        let sandbox = self
            .sandboxes
            .create()
            .map_err(|e| ReplayError::Sandbox(format!("error starting sandbox: {e}")))?;

        let started = Instant::now();
        let (tx, rx) = crossbeam::channel::bounded(1);
        let spawned = {
            let sandbox = Arc::clone(&sandbox);
            thread::Builder::new()
                .name("replay".into())
                .spawn(move || {
                    let _ = tx.send(run_protocol(sandbox.as_ref(), &source, &args));
                })
        };
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                sandbox.terminate();
                return Err(ReplayError::Sandbox(format!("failed to start replay worker: {e}")));
            }
        };

        let outcome = rx.recv_timeout(self.timeout);
        sandbox.terminate();
        let _ = worker.join();

        let text = match outcome {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                log!("replay"; "reprocessHistory did not finish within {:?}, sandbox terminated", self.timeout);
                return Err(ReplayError::Timeout(self.timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ReplayError::Protocol("replay worker exited without a result".into()));
            }
        };
        debug!("replay"; "re-process history took {:?}", started.elapsed());

        let response: ReprocessResponse = serde_json::from_str(&text)?;
        match response.error.as_deref() {
            Some(error) if !error.is_empty() => Err(ReplayError::Sandbox(error.to_string())),
            _ => Ok(response),
        }
    }
}

fn run_protocol(sandbox: &dyn ScriptSandbox, source: &str, args: &[String]) -> Result<String, ReplayError> {
    sandbox
        .load("game.js", source)
        .map_err(stage("error loading game"))?;
    sandbox
        .load("unwrap.js", UNWRAP_DEFAULT)
        .map_err(stage("error flattening game structure"))?;
    sandbox
        .call(ENTRY_POINT, args)
        .map_err(stage("error running reprocess"))
}

fn stage(stage: &'static str) -> impl Fn(SandboxError) -> ReplayError {
    move |e| ReplayError::Sandbox(format!("{stage}: {e}"))
}
