//! WebSocket Server for Live Reload
//!
//! Each accepted connection becomes one hub subscriber, served by its own
//! pump thread:
//!
//! ```text
//! acceptor thread ──accept──► pump thread ──subscribe──► LiveReloadHub
//!                               │  ▲
//!                  text frames ◄┘  └── mailbox events
//! ```

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use anyhow::Result;
use crossbeam::channel::RecvTimeoutError;
use tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tungstenite::{Error as WsError, WebSocket};

use super::hub::{LiveReloadHub, Subscription};
use crate::{debug, log};

/// Default live-reload port
pub const DEFAULT_WS_PORT: u16 = 35729;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// How often idle loops re-check the shutdown flag and the socket.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bind the WebSocket listener and start accepting clients.
///
/// Returns the port actually bound (the base port may be taken). The acceptor
/// and every client pump stop once `shutdown` is cancelled.
pub fn start_ws_server(
    interface: IpAddr,
    base_port: u16,
    hub: LiveReloadHub,
    shutdown: CancellationToken,
) -> Result<u16> {
    let (listener, actual_port) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
    listener.set_nonblocking(true)?;

    std::thread::Builder::new()
        .name("ws-accept".into())
        .spawn(move || accept_loop(&listener, &hub, &shutdown))?;

    Ok(actual_port)
}

fn accept_loop(listener: &TcpListener, hub: &LiveReloadHub, shutdown: &CancellationToken) {
    while !shutdown.is_cancelled() {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("reload"; "client connected: {}", addr);
                // Set blocking for the handshake
                let _ = stream.set_nonblocking(false);
                let hub = hub.clone();
                let shutdown = shutdown.clone();
                let spawned = std::thread::Builder::new()
                    .name("ws-client".into())
                    .spawn(move || serve_client(stream, &hub, &shutdown));
                if let Err(e) = spawned {
                    log!("reload"; "failed to start client thread: {}", e);
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                log!("reload"; "accept error: {}", e);
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

fn serve_client(stream: TcpStream, hub: &LiveReloadHub, shutdown: &CancellationToken) {
    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            debug!("reload"; "handshake failed: {}", e);
            return;
        }
    };
    // Non-blocking after the handshake so reads can be polled
    if let Err(e) = ws.get_ref().set_nonblocking(true) {
        debug!("reload"; "failed to set non-blocking: {}", e);
        return;
    }

    let subscription = hub.subscribe();
    let id = subscription.id();
    pump(&mut ws, &subscription, shutdown);
    hub.unsubscribe(subscription);
    debug!("reload"; "client {} disconnected", id);
}

/// Forward mailbox events until the socket closes or fails.
fn pump(ws: &mut WebSocket<TcpStream>, subscription: &Subscription, shutdown: &CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            let _ = ws.close(None);
            let _ = ws.flush();
            return;
        }

        // Client frames are only read to notice close and answer pings.
        match ws.read() {
            Ok(Message::Close(_)) => return,
            Ok(_) => {}
            Err(e) if would_block(&e) => {}
            Err(_) => return,
        }

        let sent = match subscription.recv_timeout(POLL_INTERVAL) {
            Ok(event) => ws.send(Message::Text(event.to_json().into())),
            Err(RecvTimeoutError::Timeout) => ws.flush(),
            Err(RecvTimeoutError::Disconnected) => return,
        };
        match sent {
            Ok(()) => {}
            // Queued in tungstenite's write buffer, flushed on a later pass.
            Err(e) if would_block(&e) => {}
            Err(e) => {
                debug!("reload"; "send failed: {}", e);
                return;
            }
        }
    }
}

fn would_block(error: &WsError) -> bool {
    matches!(error, WsError::Io(e) if e.kind() == ErrorKind::WouldBlock)
}

// =============================================================================
// Helpers
// =============================================================================

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(interface, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow::anyhow!(
        "failed to bind live-reload server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
