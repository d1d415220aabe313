//! Live reload: the broadcast hub and its WebSocket transport.
//!
//! ```text
//! BuildActor ──reload / buildError──► LiveReloadHub ──mailbox──► ws pump ──► Browser
//! heartbeat  ──ping─────────────────►
//! ```

pub mod hub;
pub mod message;
pub mod server;

pub use hub::{HEARTBEAT_INTERVAL, LiveReloadHub, MAILBOX_DEPTH, Subscription};
pub use message::ReloadEvent;
pub use server::{DEFAULT_WS_PORT, start_ws_server};
