//! `bz replay`: re-derive a save state offline.

use std::fs;
use std::io::{Write, stdout};
use std::path::Path;

use anyhow::{Context, Result};

use super::common::Game;
use crate::debug;
use crate::replay::{ReplayEngine, SaveStateData, reprocess_save_state};

pub fn replay_save(game: &Game, save: &Path) -> Result<()> {
    let text = fs::read_to_string(save)
        .with_context(|| format!("failed to read {}", save.display()))?;
    let save: SaveStateData = serde_json::from_str(&text)
        .with_context(|| format!("invalid save state {}", save.display()))?;

    let engine = ReplayEngine::new(game.manifest.bundle_path(&game.root));
    debug!("replay"; "bundle {}", engine.bundle().display());
    let fresh = reprocess_save_state(&engine, &save)?;

    let mut out = stdout().lock();
    serde_json::to_writer_pretty(&mut out, &fresh)?;
    writeln!(out)?;
    Ok(())
}
