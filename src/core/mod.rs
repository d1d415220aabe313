//! Core types - pure abstractions shared across the codebase.

mod driver;
mod state;
mod target;

pub use driver::BuildMode;
pub use state::{is_shutdown, register_server, request_shutdown, setup_shutdown_handler};
pub use target::{Target, Targets};
