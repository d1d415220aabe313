//! Live Reload Message Protocol
//!
//! JSON text frames sent to browser clients:
//!
//! - `{"type":"reload","target":"ui"}`: a module was rebuilt
//! - `{"type":"buildError","out":"...","err":"...","target":"game"}`: a build failed
//! - `{"type":"ping"}`: heartbeat

use serde::{Deserialize, Serialize};

use crate::core::Target;

/// Event broadcast by the live-reload hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReloadEvent {
    /// Module rebuilt, clients reload it
    Reload { target: Target },

    /// Build failed, clients show the output instead of reloading
    BuildError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Target>,
        out: String,
        err: String,
    },

    /// Keep-alive
    Ping,
}

impl ReloadEvent {
    pub fn build_error(target: Option<Target>, out: impl Into<String>, err: impl Into<String>) -> Self {
        Self::BuildError {
            target,
            out: out.into(),
            err: err.into(),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"ping"}"#.to_string())
    }

    /// Parse from JSON string
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}
