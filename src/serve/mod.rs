//! HTTP API for replaying and storing save states.

mod api;
mod lifecycle;
mod response;
mod states;

pub use api::Api;
pub use lifecycle::{bind_with_retry, spawn_dev_loop, wait_for_shutdown};
pub use response::ApiResponse;
pub use states::{SAVE_STATES_DIR, SaveStateEntry, SaveStateStore};

use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam::channel;
use tiny_http::{Request, Server};

use crate::core::{is_shutdown, register_server};
use crate::{debug, log};

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Requests are handled on a small pool so a slow replay does not block others.
const REQUEST_THREADS: usize = 4;

/// Bound server ready to accept requests
pub struct BoundServer {
    server: Arc<Server>,
    addr: SocketAddr,
    shutdown_rx: channel::Receiver<()>,
}

/// Bind the HTTP server and register it with the Ctrl+C handler,
/// without starting the request loop.
pub fn bind_server(interface: IpAddr, port: u16) -> Result<BoundServer> {
    let (server, addr) = bind_with_retry(interface, port)?;
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    register_server(Arc::clone(&server), shutdown_tx);

    Ok(BoundServer {
        server,
        addr,
        shutdown_rx,
    })
}

impl BoundServer {
    /// Fires once when Ctrl+C is received.
    pub fn shutdown_signal(&self) -> channel::Receiver<()> {
        self.shutdown_rx.clone()
    }

    /// Start the request loop. Blocks until the server is unblocked.
    pub fn run(self, api: Arc<Api>) -> Result<()> {
        log!("serve"; "http://{}", self.addr);
        run_request_loop(&self.server, &api)
    }
}

fn run_request_loop(server: &Server, api: &Arc<Api>) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(REQUEST_THREADS)
        .thread_name(|i| format!("http-{i}"))
        .build()
        .context("failed to create request thread pool")?;

    for request in server.incoming_requests() {
        let api = Arc::clone(api);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &api) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    Ok(())
}

fn handle_request(mut request: Request, api: &Api) -> Result<()> {
    if is_shutdown() {
        return response::respond_unavailable(request);
    }

    let mut body = Vec::new();
    request
        .as_reader()
        .read_to_end(&mut body)
        .context("failed to read request body")?;

    let response = api.handle(request.method(), request.url(), &body);
    debug!("serve"; "{} {} -> {}", request.method(), request.url(), response.status());
    response::send(request, response)
}
