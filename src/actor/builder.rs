//! Build Actor - runs dev rebuilds one at a time
//!
//! Rebuild requests that arrive while a build is running queue up in the
//! channel and are merged (target union) into the next build.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::messages::BuildMsg;
use crate::build::{BuildError, BuildOrchestrator};
use crate::core::{BuildMode, Targets};
use crate::logger;
use crate::reload::LiveReloadHub;
use crate::{debug, log};

pub struct BuildActor {
    rx: mpsc::Receiver<BuildMsg>,
    orchestrator: Arc<BuildOrchestrator>,
    hub: LiveReloadHub,
    shutdown: CancellationToken,
}

impl BuildActor {
    pub fn new(
        rx: mpsc::Receiver<BuildMsg>,
        orchestrator: Arc<BuildOrchestrator>,
        hub: LiveReloadHub,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            rx,
            orchestrator,
            hub,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        loop {
            let msg = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                msg = self.rx.recv() => msg,
            };
            let Some(BuildMsg::Rebuild(mut targets)) = msg else {
                break; // Shutdown or all senders gone
            };

            let stop = self.coalesce(&mut targets);
            if !targets.is_empty() {
                let finished = tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => false,
                    () = self.rebuild(targets) => true,
                };
                if !finished {
                    debug!("build"; "build interrupted by shutdown");
                    break;
                }
            }
            if stop {
                break;
            }
        }
        debug!("build"; "stopped");
    }

    /// Merge every request already queued into `targets`.
    /// Returns `true` when a `Shutdown` was among them.
    fn coalesce(&mut self, targets: &mut Targets) -> bool {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                BuildMsg::Rebuild(more) => *targets |= more,
                BuildMsg::Shutdown => return true,
            }
        }
        false
    }

    async fn rebuild(&self, targets: Targets) {
        match self.orchestrator.build(BuildMode::Dev, targets).await {
            Ok(_) => {
                for target in targets.targets() {
                    self.hub.reload(target);
                }
                logger::status_success(&format!("rebuilt {}", names(targets)));
            }
            Err(e) => report_failure(&self.hub, &e),
        }
    }
}

fn report_failure(hub: &LiveReloadHub, error: &BuildError) {
    let stdout = error.stdout();
    let stderr = error.stderr();
    hub.build_error(error.target(), &stdout, &stderr);

    let summary = match error.target() {
        Some(target) => format!("build failed: {}", target.as_str()),
        None => "build failed".to_string(),
    };
    log!("error"; "{}", error);
    logger::status_error(&summary, &stderr);
}

fn names(targets: Targets) -> String {
    targets
        .targets()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::CommandRunner;
    use crate::core::Target;
    use crate::manifest::Manifest;
    use crate::reload::ReloadEvent;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn orchestrator(dir: &TempDir, ui_dev: &str, game_dev: &str) -> Arc<BuildOrchestrator> {
        fs::create_dir_all(dir.path().join("ui")).unwrap();
        fs::create_dir_all(dir.path().join("game")).unwrap();
        let json = format!(
            r#"{{"minPlayers":1,"maxPlayers":2,
                "ui":{{"root":"ui","build":{{"dev":{ui_dev}}},"outDir":"dist"}},
                "game":{{"root":"game","build":{{"dev":{game_dev}}},"out":"dist/index.js"}}}}"#
        );
        let manifest: Manifest = serde_json::from_str(&json).unwrap();
        Arc::new(
            BuildOrchestrator::new(dir.path(), Arc::new(manifest))
                .with_runner(CommandRunner::new().quiet()),
        )
    }

    fn spawn_actor(
        orchestrator: Arc<BuildOrchestrator>,
        hub: &LiveReloadHub,
    ) -> (mpsc::Sender<BuildMsg>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let actor = BuildActor::new(rx, orchestrator, hub.clone(), CancellationToken::new());
        (tx, tokio::spawn(actor.run()))
    }

    #[test]
    fn test_names() {
        assert_eq!(names(Targets::all()), "ui, game");
        assert_eq!(names(Targets::GAME), "game");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_reloads_each_built_target() {
        let dir = TempDir::new().unwrap();
        let hub = LiveReloadHub::new();
        let sub = hub.subscribe();
        let (tx, handle) = spawn_actor(orchestrator(&dir, r#""true""#, r#""true""#), &hub);

        tx.send(BuildMsg::Rebuild(Targets::all())).await.unwrap();
        tx.send(BuildMsg::Shutdown).await.unwrap();
        handle.await.unwrap();

        assert_eq!(
            sub.drain(),
            vec![
                ReloadEvent::Reload { target: Target::Ui },
                ReloadEvent::Reload { target: Target::Game },
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_is_tagged_and_loop_continues() {
        let dir = TempDir::new().unwrap();
        let hub = LiveReloadHub::new();
        let sub = hub.subscribe();
        let orchestrator = orchestrator(&dir, r#""true""#, r#""sh fail.sh""#);
        fs::write(dir.path().join("game/fail.sh"), "echo nope 1>&2\nexit 1\n").unwrap();
        let (tx, handle) = spawn_actor(orchestrator, &hub);

        tx.send(BuildMsg::Rebuild(Targets::GAME)).await.unwrap();
        let event = tokio::task::spawn_blocking(move || {
            let event = sub.recv_timeout(Duration::from_secs(5)).unwrap();
            (event, sub)
        })
        .await
        .unwrap();
        let (event, sub) = event;
        assert_eq!(event, ReloadEvent::build_error(Some(Target::Game), "", "nope\n"));

        tx.send(BuildMsg::Rebuild(Targets::UI)).await.unwrap();
        tx.send(BuildMsg::Shutdown).await.unwrap();
        handle.await.unwrap();
        assert_eq!(sub.drain(), vec![ReloadEvent::Reload { target: Target::Ui }]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_queued_requests_are_coalesced() {
        let dir = TempDir::new().unwrap();
        let hub = LiveReloadHub::new();
        let sub = hub.subscribe();
        let orchestrator = orchestrator(&dir, r#""sh count.sh""#, r#""sh count.sh""#);
        for module in ["ui", "game"] {
            fs::write(
                dir.path().join(module).join("count.sh"),
                "echo x >> runs\nsleep 0.2\n",
            )
            .unwrap();
        }

        let (tx, rx) = mpsc::channel(32);
        // Queue everything before the actor starts so the first receive
        // sees all of it.
        tx.send(BuildMsg::Rebuild(Targets::UI)).await.unwrap();
        tx.send(BuildMsg::Rebuild(Targets::GAME)).await.unwrap();
        tx.send(BuildMsg::Rebuild(Targets::UI)).await.unwrap();
        tx.send(BuildMsg::Shutdown).await.unwrap();
        BuildActor::new(rx, orchestrator, hub.clone(), CancellationToken::new())
            .run()
            .await;

        let runs = |m: &str| fs::read_to_string(dir.path().join(m).join("runs")).unwrap();
        assert_eq!(runs("ui"), "x\n");
        assert_eq!(runs("game"), "x\n");
        assert_eq!(sub.drain().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_idle_actor() {
        let dir = TempDir::new().unwrap();
        let hub = LiveReloadHub::new();
        let (_tx, rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let actor = BuildActor::new(
            rx,
            orchestrator(&dir, r#""true""#, r#""true""#),
            hub,
            shutdown.clone(),
        );
        let handle = tokio::spawn(actor.run());
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
