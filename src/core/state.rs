//! Process-wide shutdown state for `bz run`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tiny_http::Server;

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// HTTP server reference for graceful shutdown
static SERVER: OnceLock<Arc<Server>> = OnceLock::new();

/// Shutdown signal sender for the actor system
static SHUTDOWN_TX: OnceLock<crossbeam::channel::Sender<()>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start
///
/// - Before `register_server()`: exit right away (one-shot commands)
/// - After `register_server()`: unblock the HTTP loop and notify actors
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        if request_shutdown() {
            crate::log!("run"; "shutting down...");
        } else {
            std::process::exit(130);
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Stop `bz run`: notify the actors and unblock the HTTP loop.
///
/// Returns false if no server has been registered yet.
pub fn request_shutdown() -> bool {
    SHUTDOWN.store(true, Ordering::SeqCst);

    if let Some(tx) = SHUTDOWN_TX.get() {
        let _ = tx.send(());
    }

    match SERVER.get() {
        Some(server) => {
            server.unblock();
            true
        }
        None => false,
    }
}

/// Register the HTTP server for graceful shutdown
///
/// Call this after binding the server, before entering the request loop
pub fn register_server(server: Arc<Server>, shutdown_tx: crossbeam::channel::Sender<()>) {
    let _ = SERVER.set(server);
    let _ = SHUTDOWN_TX.set(shutdown_tx);
}

/// Check if shutdown has been requested
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}
