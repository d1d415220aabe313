//! Multi-target build orchestration.
//!
//! A build request names a mode and a set of targets. Every command of every
//! requested target becomes a [`BuildUnit`]; all units run concurrently and
//! share one cancellation token:
//!
//! ```text
//! build(Dev, UI | GAME)
//!   ├── unit  ui/    "esbuild src/index.tsx --bundle ..."  ─┐
//!   ├── unit  game/  "esbuild src/game.ts --bundle ..."    ─┼─► first failure: cancel rest, Err
//!   └── unit  game/  "tsc --noEmit"                        ─┘   all ok: Ok(last finished)
//! ```

mod clean;
mod runner;

pub use clean::clean;
pub use runner::{CAPTURE_LIMIT, CommandResult, CommandRunner, DEFAULT_TIMEOUT, RunError};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::core::{BuildMode, Target, Targets};
use crate::manifest::Manifest;
use crate::{debug, log};

/// One command to run for one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildUnit {
    pub target: Target,
    pub dir: PathBuf,
    pub command: String,
}

/// Output of a successful build.
///
/// Holds the output of whichever unit finished last; callers should only
/// rely on the pass/fail signal.
#[derive(Debug, Default)]
pub struct BuildOutput {
    pub target: Option<Target>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{} build failed: `{command}` {source}", .target.label())]
    Failed {
        target: Target,
        command: String,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        #[source]
        source: RunError,
    },

    #[error("build worker crashed")]
    Worker(#[source] JoinError),
}

impl BuildError {
    /// The target whose unit failed, if known.
    pub fn target(&self) -> Option<Target> {
        match self {
            Self::Failed { target, .. } => Some(*target),
            Self::Worker(_) => None,
        }
    }

    /// Captured stdout as text.
    pub fn stdout(&self) -> String {
        match self {
            Self::Failed { stdout, .. } => String::from_utf8_lossy(stdout).into_owned(),
            Self::Worker(_) => String::new(),
        }
    }

    /// Captured stderr as text, or the error itself when nothing was captured.
    pub fn stderr(&self) -> String {
        match self {
            Self::Failed { stderr, .. } if !stderr.is_empty() => {
                String::from_utf8_lossy(stderr).into_owned()
            }
            _ => self.to_string(),
        }
    }
}

/// Resolves manifest commands into units and runs them.
#[derive(Debug, Clone)]
pub struct BuildOrchestrator {
    game_root: PathBuf,
    manifest: Arc<Manifest>,
    runner: CommandRunner,
}

impl BuildOrchestrator {
    pub fn new(game_root: impl Into<PathBuf>, manifest: Arc<Manifest>) -> Self {
        Self {
            game_root: game_root.into(),
            manifest,
            runner: CommandRunner::new(),
        }
    }

    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn game_root(&self) -> &Path {
        &self.game_root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Units for `targets` in `mode`, UI first, identical `(dir, command)` pairs once.
    pub fn units(&self, mode: BuildMode, targets: Targets) -> Vec<BuildUnit> {
        let mut seen = FxHashSet::default();
        let mut units = Vec::new();
        for target in targets.targets() {
            let module = self.manifest.module(target);
            let dir = module.root_dir(&self.game_root);
            for command in module.commands(mode) {
                if seen.insert((dir.clone(), command.clone())) {
                    units.push(BuildUnit {
                        target,
                        dir: dir.clone(),
                        command: command.clone(),
                    });
                }
            }
        }
        units
    }

    /// Build `targets` in `mode`.
    ///
    /// The first failing unit cancels its siblings and becomes the result.
    pub async fn build(&self, mode: BuildMode, targets: Targets) -> Result<BuildOutput, BuildError> {
        let units = self.units(mode, targets);
        if units.is_empty() {
            debug!("build"; "no {} commands for {}", mode, targets.describe());
            return Ok(BuildOutput::default());
        }
        for target in targets.targets() {
            log!("build"; "building {} ({})", target.label(), mode);
        }

        let cancel = CancellationToken::new();
        let mut running = JoinSet::new();
        for unit in units {
            let runner = self.runner.clone();
            let cancel = cancel.clone();
            running.spawn(async move {
                let result = runner.run(&cancel, &unit.dir, &unit.command).await;
                (unit, result)
            });
        }

        let mut last = BuildOutput::default();
        while let Some(joined) = running.join_next().await {
            let (unit, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    cancel.cancel();
                    drain(&mut running).await;
                    return Err(BuildError::Worker(e));
                }
            };
            match result.status {
                Ok(()) => {
                    last = BuildOutput {
                        target: Some(unit.target),
                        stdout: result.stdout,
                        stderr: result.stderr,
                    };
                }
                Err(source) => {
                    cancel.cancel();
                    drain(&mut running).await;
                    return Err(BuildError::Failed {
                        target: unit.target,
                        command: unit.command,
                        stdout: result.stdout,
                        stderr: result.stderr,
                        source,
                    });
                }
            }
        }
        Ok(last)
    }
}

/// Wait for cancelled siblings to be killed and reaped.
async fn drain(running: &mut JoinSet<(BuildUnit, CommandResult)>) {
    while let Some(joined) = running.join_next().await {
        if let Ok((unit, result)) = joined {
            debug!("build"; "`{}` stopped: {:?}", unit.command, result.status.err());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn manifest(ui_dev: &str, game_dev: &str) -> Arc<Manifest> {
        let json = format!(
            r#"{{"minPlayers":1,"maxPlayers":2,
                "ui":{{"root":"ui","build":{{"dev":{ui_dev}}},"watchPaths":["ui/src"],"outDir":"dist"}},
                "game":{{"root":"game","build":{{"dev":{game_dev}}},"watchPaths":["game/src"],"out":"dist/index.js"}}}}"#
        );
        Arc::new(serde_json::from_str(&json).unwrap())
    }

    fn fixture(ui_dev: &str, game_dev: &str) -> (TempDir, BuildOrchestrator) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("ui")).unwrap();
        fs::create_dir_all(dir.path().join("game")).unwrap();
        let orchestrator = BuildOrchestrator::new(dir.path(), manifest(ui_dev, game_dev))
            .with_runner(CommandRunner::new().quiet());
        (dir, orchestrator)
    }

    #[test]
    fn test_units_follow_targets_and_dedupe() {
        let (dir, orchestrator) = fixture(r#"["true", "true", "echo ui"]"#, r#""true""#);

        let ui = orchestrator.units(BuildMode::Dev, Targets::UI);
        assert_eq!(ui.len(), 2);
        assert!(ui.iter().all(|u| u.target == Target::Ui));
        assert_eq!(ui[0].dir, dir.path().join("ui"));

        let both = orchestrator.units(BuildMode::Dev, Targets::all());
        assert_eq!(both.len(), 3);
        assert_eq!(both[2].target, Target::Game);
        assert_eq!(both[2].dir, dir.path().join("game"));

        assert!(orchestrator.units(BuildMode::Prod, Targets::all()).is_empty());
        assert!(orchestrator.units(BuildMode::Dev, Targets::empty()).is_empty());
    }

    #[tokio::test]
    async fn test_no_units_succeeds_empty() {
        let (_dir, orchestrator) = fixture(r#""true""#, r#""true""#);
        let output = orchestrator
            .build(BuildMode::Prod, Targets::all())
            .await
            .unwrap();
        assert!(output.target.is_none());
        assert!(output.stdout.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_all_units_succeed() {
        let (_dir, orchestrator) = fixture(r#""echo ui""#, r#""echo game""#);
        let output = orchestrator
            .build(BuildMode::Dev, Targets::all())
            .await
            .unwrap();
        let target = output.target.unwrap();
        let expected: &[u8] = match target {
            Target::Ui => b"ui\n",
            Target::Game => b"game\n",
        };
        assert_eq!(output.stdout, expected);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_reports_target_and_output() {
        let (dir, orchestrator) = fixture(r#""true""#, r#""sh fail.sh""#);
        fs::write(dir.path().join("game/fail.sh"), "echo partial\necho broken 1>&2\nexit 3\n")
            .unwrap();

        let err = orchestrator
            .build(BuildMode::Dev, Targets::all())
            .await
            .unwrap_err();
        assert_eq!(err.target(), Some(Target::Game));
        assert_eq!(err.stdout(), "partial\n");
        assert_eq!(err.stderr(), "broken\n");
        assert!(matches!(err, BuildError::Failed { source: RunError::Exit(_), .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_cancels_sibling_units() {
        // The UI unit would create `done` after sleeping; the failing Game unit
        // must stop it before that happens.
        let (dir, orchestrator) = fixture(r#""sh slow.sh""#, r#""false""#);
        fs::write(dir.path().join("ui/slow.sh"), "sleep 3\ntouch done\n").unwrap();

        let started = Instant::now();
        let err = orchestrator
            .build(BuildMode::Dev, Targets::all())
            .await
            .unwrap_err();
        assert_eq!(err.target(), Some(Target::Game));
        assert!(started.elapsed() < Duration::from_secs(3));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(!dir.path().join("ui/done").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_surfaces_as_build_failure() {
        let (_dir, orchestrator) = fixture(r#""sleep 5""#, r#""true""#);
        let orchestrator =
            orchestrator.with_runner(CommandRunner::new().quiet().with_timeout(Duration::from_millis(200)));

        let err = orchestrator
            .build(BuildMode::Dev, Targets::UI)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Failed { source: RunError::Timeout(_), .. }));
        assert!(err.to_string().starts_with("UI build failed"));
    }
}
