//! `bz run`: the dev loop plus the replay API.
//!
//! ```text
//! main thread:  bind HTTP ──► spawn dev loop (wait ready) ──► request loop ──► wait_for_shutdown
//! dev-loop thread:            watcher → ws server → actors → initial build
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Result;

use super::common::Game;
use crate::actor::Coordinator;
use crate::build::BuildOrchestrator;
use crate::core::Target;
use crate::replay::ReplayEngine;
use crate::logger;
use crate::serve::{Api, SaveStateStore, bind_server, spawn_dev_loop, wait_for_shutdown};

pub struct RunOptions {
    pub interface: IpAddr,
    pub port: u16,
    pub ws_port: u16,
}

pub fn run_dev(game: &Game, options: &RunOptions) -> Result<()> {
    let orchestrator = BuildOrchestrator::new(&game.root, Arc::clone(&game.manifest));
    let coordinator = Coordinator::new(orchestrator).with_ws(options.interface, options.ws_port);
    for target in Target::ALL {
        if coordinator.watch_set().paths(target).next().is_none() {
            logger::status_warning(&format!(
                "{} has no watchPaths, it will not rebuild on change",
                target.label()
            ));
        }
    }

    let states = SaveStateStore::open(&game.root)?;
    let engine = ReplayEngine::new(game.manifest.bundle_path(&game.root));
    let api = Arc::new(Api::new(engine, states));

    let bound = bind_server(options.interface, options.port)?;

    let (_ws_port, dev_loop) = spawn_dev_loop(coordinator, bound.shutdown_signal())?;

    bound.run(api)?;
    wait_for_shutdown(dev_loop)
}
