//! Server lifecycle management.

use std::net::{IpAddr, SocketAddr};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, anyhow};
use crossbeam::channel::{self, Receiver};
use tiny_http::Server;

use crate::actor::Coordinator;
use crate::core::request_shutdown;
use crate::{log, logger};

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Bind to the specified interface and port, with automatic port retry.
pub fn bind_with_retry(interface: IpAddr, base_port: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;

    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                let addr = server.server_addr().to_ip().unwrap_or(addr);
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow!(
        "failed to bind after {} attempts (ports {}-{}): {}",
        MAX_PORT_RETRIES,
        base_port,
        base_port.saturating_add(MAX_PORT_RETRIES - 1),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

/// Start the dev loop on its own thread and runtime.
///
/// Blocks until the watcher and live-reload server are up; a failure there
/// is returned so the caller can exit. On success yields the live-reload
/// port and the thread handle.
///
/// If the dev loop dies later, the whole `bz run` is shut down so the API
/// does not outlive the rebuilds.
pub fn spawn_dev_loop(
    coordinator: Coordinator,
    shutdown_rx: Receiver<()>,
) -> Result<(u16, JoinHandle<Result<()>>)> {
    let (ready_tx, ready_rx) = channel::bounded(1);

    let handle = thread::Builder::new()
        .name("dev-loop".into())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = ready_tx.send(Err(anyhow!("failed to create tokio runtime: {e}")));
                    return Ok(());
                }
            };

            let coordinator = coordinator.with_shutdown_signal(shutdown_rx);
            let result = rt.block_on(coordinator.run(ready_tx));
            if let Err(e) = &result {
                logger::status_error("dev loop stopped, shutting down", &format!("{e:#}"));
                request_shutdown();
            }
            result
        })?;

    match ready_rx.recv() {
        Ok(Ok(ws_port)) => Ok((ws_port, handle)),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            let _ = handle.join();
            Err(anyhow!("dev loop exited during startup"))
        }
    }
}

/// Wait for the dev loop to stop (max 2 seconds) and return how it ended.
pub fn wait_for_shutdown(handle: JoinHandle<Result<()>>) -> Result<()> {
    for _ in 0..40 {
        if handle.is_finished() {
            return handle
                .join()
                .map_err(|_| anyhow!("dev loop panicked"))?;
        }
        thread::sleep(Duration::from_millis(50));
    }
    Ok(())
}
