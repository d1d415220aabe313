//! Command-line interface module.

mod args;
pub mod build;
pub mod clean;
pub mod common;
pub mod replay;
pub mod run;

pub use args::{Cli, Commands, GameArgs};
