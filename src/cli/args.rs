//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::reload::DEFAULT_WS_PORT;
use crate::serve::DEFAULT_HTTP_PORT;

/// Dev harness for Boardzilla-style games: rebuild, live reload, replay
#[derive(Parser, Debug, Clone)]
#[command(name = "bz", version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Watch, rebuild and live-reload a game, and serve the replay API
    #[command(visible_alias = "r")]
    Run {
        #[command(flatten)]
        game: GameArgs,

        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        interface: IpAddr,

        /// Port for the replay and save-state API
        #[arg(short, long, default_value_t = DEFAULT_HTTP_PORT)]
        port: u16,

        /// Port for the live-reload WebSocket
        #[arg(long, default_value_t = DEFAULT_WS_PORT)]
        ws_port: u16,
    },

    /// Clean outputs, then build both modules once
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        game: GameArgs,

        /// Use the dev build commands instead of prod
        #[arg(short, long)]
        dev: bool,
    },

    /// Remove the build outputs declared by the manifest
    Clean {
        #[command(flatten)]
        game: GameArgs,
    },

    /// Re-derive a save state against the current Game bundle and print it
    Replay {
        #[command(flatten)]
        game: GameArgs,

        /// Save state JSON file
        #[arg(value_hint = clap::ValueHint::FilePath)]
        save: PathBuf,
    },
}

/// Arguments shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct GameArgs {
    /// Game root (the directory holding game.v1.json)
    #[arg(short, long, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    pub root: PathBuf,
}
