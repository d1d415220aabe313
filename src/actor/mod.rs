//! Actor System for the Dev Loop
//!
//! ```text
//! FsActor --> BuildActor --> LiveReloadHub
//! (watch)     (rebuild)      (broadcast)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `fs` - File system watcher with per-target debouncing
//! - `builder` - Serialized dev rebuilds
//! - `coordinator` - Wires up and runs actors

pub mod builder;
pub mod coordinator;
pub mod fs;
pub mod messages;

pub use coordinator::Coordinator;
