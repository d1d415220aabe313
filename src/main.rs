//! bz - local dev harness for two-module board games.

mod actor;
mod build;
mod cli;
mod core;
mod logger;
mod manifest;
mod reload;
mod replay;
mod serve;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::common::Game;
use cli::{Cli, Commands};
use core::BuildMode;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    match &cli.command {
        Commands::Run {
            game,
            interface,
            port,
            ws_port,
        } => {
            let options = cli::run::RunOptions {
                interface: *interface,
                port: *port,
                ws_port: *ws_port,
            };
            cli::run::run_dev(&Game::load(&game.root)?, &options)
        }
        Commands::Build { game, dev } => {
            let mode = if *dev { BuildMode::Dev } else { BuildMode::Prod };
            cli::build::build_game(&Game::load(&game.root)?, mode)
        }
        Commands::Clean { game } => cli::clean::clean_game(&Game::load(&game.root)?),
        Commands::Replay { game, save } => cli::replay::replay_save(&Game::load(&game.root)?, save),
    }
}
