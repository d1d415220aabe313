//! `bz build`: clean, then one build of both modules.

use std::sync::Arc;

use anyhow::{Context, Result};

use super::common::Game;
use crate::build::BuildOrchestrator;
use crate::core::{BuildMode, Targets};
use crate::log;

/// Build output is mirrored live by the runner, so only the outcome is
/// reported here.
pub fn build_game(game: &Game, mode: BuildMode) -> Result<()> {
    crate::build::clean(&game.root, &game.manifest)?;

    let orchestrator = BuildOrchestrator::new(&game.root, Arc::clone(&game.manifest));
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(orchestrator.build(mode, Targets::all()))?;
    log!("build"; "done ({})", mode);
    Ok(())
}
