//! `bz clean`

use anyhow::Result;

use super::common::Game;

pub fn clean_game(game: &Game) -> Result<()> {
    crate::build::clean(&game.root, &game.manifest)
}
