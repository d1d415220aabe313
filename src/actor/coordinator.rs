//! Actor Coordinator - Wires up the Dev Loop
//!
//! # Startup order
//!
//! 1. Attach the watcher to every watch path (failure is fatal)
//! 2. Bind the live-reload WebSocket server (failure is fatal)
//! 3. Report readiness, start the actors and the heartbeat
//! 4. Request the initial dev build of both modules
//!
//! ```text
//! FsActor --Rebuild--> BuildActor --reload/buildError--> LiveReloadHub --> ws clients
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use crossbeam::channel::{Receiver, Sender, TryRecvError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::builder::BuildActor;
use super::fs::{FsActor, WatchSet};
use super::messages::BuildMsg;
use crate::build::BuildOrchestrator;
use crate::core::Targets;
use crate::reload::{DEFAULT_WS_PORT, HEARTBEAT_INTERVAL, LiveReloadHub, start_ws_server};
use crate::{debug, log};

/// Channel buffer size
const CHANNEL_BUFFER: usize = 32;

/// How often the shutdown signal is polled.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// How long stopping actors get before the runtime is dropped.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Coordinator - wires up and runs the dev loop
pub struct Coordinator {
    orchestrator: Arc<BuildOrchestrator>,
    watch_set: WatchSet,
    hub: LiveReloadHub,
    interface: IpAddr,
    ws_port: u16,
    debounce: Option<Duration>,
    /// Optional shutdown signal receiver
    shutdown_rx: Option<Receiver<()>>,
}

impl Coordinator {
    pub fn new(orchestrator: BuildOrchestrator) -> Self {
        let watch_set = WatchSet::from_manifest(orchestrator.manifest(), orchestrator.game_root());
        Self {
            orchestrator: Arc::new(orchestrator),
            watch_set,
            hub: LiveReloadHub::new(),
            interface: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ws_port: DEFAULT_WS_PORT,
            debounce: None,
            shutdown_rx: None,
        }
    }

    /// Set the live-reload interface and base port
    pub fn with_ws(mut self, interface: IpAddr, port: u16) -> Self {
        self.interface = interface;
        self.ws_port = port;
        self
    }

    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce = Some(window);
        self
    }

    /// Set shutdown signal receiver
    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    pub fn hub(&self) -> LiveReloadHub {
        self.hub.clone()
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.watch_set
    }

    /// Run the dev loop until the shutdown signal fires.
    ///
    /// `ready` receives the live-reload port once the watcher and the
    /// WebSocket server are up, or the startup error. Returns an error if an
    /// actor stops before the signal.
    pub async fn run(self, ready: Sender<Result<u16>>) -> Result<()> {
        let Self {
            orchestrator,
            watch_set,
            hub,
            interface,
            ws_port,
            debounce,
            shutdown_rx,
        } = self;

        let shutdown = CancellationToken::new();
        let (build_tx, build_rx) = mpsc::channel::<BuildMsg>(CHANNEL_BUFFER);

        let watch_count = watch_set.roots().len();
        let fs_actor = match FsActor::new(watch_set, build_tx.clone(), shutdown.clone()) {
            Ok(actor) => match debounce {
                Some(window) => actor.with_debounce(window),
                None => actor,
            },
            Err(e) => {
                let _ = ready.send(Err(e.into()));
                return Ok(());
            }
        };

        let ws_port = match start_ws_server(interface, ws_port, hub.clone(), shutdown.clone()) {
            Ok(port) => port,
            Err(e) => {
                shutdown.cancel();
                let _ = ready.send(Err(e));
                return Ok(());
            }
        };
        log!("watch"; "watching {} paths", watch_count);
        log!("serve"; "live reload on ws://{}:{}", interface, ws_port);
        let _ = ready.send(Ok(ws_port));

        let builder = BuildActor::new(build_rx, orchestrator, hub.clone(), shutdown.clone());
        let mut actors = JoinSet::new();
        actors.spawn(async move {
            builder.run().await;
            "build"
        });
        actors.spawn(async move {
            fs_actor.run().await;
            "watch"
        });
        let heartbeat = hub.spawn_heartbeat(HEARTBEAT_INTERVAL, shutdown.clone());

        let _ = build_tx.send(BuildMsg::Rebuild(Targets::all())).await;

        debug!("actor"; "start");
        let outcome = supervise(&mut actors, shutdown_rx).await;

        let _ = build_tx.try_send(BuildMsg::Shutdown);
        shutdown.cancel();
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while actors.join_next().await.is_some() {}
            let _ = heartbeat.await;
        })
        .await;

        debug!("actor"; "stopped");
        outcome
    }
}

/// Wait for the shutdown signal. An actor finishing first is an error.
async fn supervise(actors: &mut JoinSet<&'static str>, signal: Option<Receiver<()>>) -> Result<()> {
    tokio::select! {
        () = wait_for_signal(signal) => {
            debug!("actor"; "shutdown signal received");
            Ok(())
        }
        Some(joined) = actors.join_next() => Err(match joined {
            Ok(name) => anyhow!("{name} actor stopped unexpectedly"),
            Err(e) if e.is_panic() => anyhow!("an actor panicked"),
            Err(e) => anyhow!("an actor was cancelled: {e}"),
        }),
    }
}

/// Resolves when the signal fires or its sender is gone. Never resolves
/// without a receiver.
async fn wait_for_signal(rx: Option<Receiver<()>>) {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        match rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => tokio::time::sleep(SHUTDOWN_POLL).await,
        }
    }
}
