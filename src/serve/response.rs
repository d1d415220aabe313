//! HTTP responses for the replay API.

use anyhow::{Result, anyhow};
use serde::Serialize;
use serde_json::json;
use tiny_http::{Header, Request, Response, StatusCode};

const JSON: &str = "application/json";

/// A response decided by the router, sent by the request loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    status: u16,
    body: Option<Vec<u8>>,
}

impl ApiResponse {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                body: Some(body),
            },
            Err(e) => Self::error(500, &format!("failed to encode response: {e}")),
        }
    }

    /// `{"error": message}`
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: Some(json!({ "error": message }).to_string().into_bytes()),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self { status, body: None }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }
}

pub fn send(request: Request, response: ApiResponse) -> Result<()> {
    let status = StatusCode(response.status);
    match response.body {
        Some(body) => {
            let response = Response::from_data(body)
                .with_status_code(status)
                .with_header(make_header("Content-Type", JSON)?)
                .with_header(make_header("Cache-Control", "no-store")?);
            request.respond(response)?;
        }
        None => request.respond(Response::empty(status))?,
    }
    Ok(())
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    send(request, ApiResponse::error(503, "shutting down"))
}

fn make_header(key: &'static str, value: &'static str) -> Result<Header> {
    Header::from_bytes(key, value).map_err(|()| anyhow!("invalid header `{key}: {value}`"))
}
