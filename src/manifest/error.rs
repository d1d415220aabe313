//! Manifest error types.

use owo_colors::OwoColorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while locating, reading or validating the manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no manifest in `{}` (expected game.v1.json or game.json)", .0.display())]
    NotFound(PathBuf),

    #[error("IO error when reading `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse `{}`", .0.display())]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("{0}")]
    Validation(ManifestDiagnostics),
}

/// A single manifest problem, addressed by its JSON field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDiagnostic {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ManifestDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{} {} {}",
            "[".dimmed(),
            self.field.cyan(),
            "]".dimmed(),
            "→".red(),
            self.message
        )
    }
}

/// All problems found in one manifest, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiagnostics(Vec<ManifestDiagnostic>);

impl ManifestDiagnostics {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(ManifestDiagnostic {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestDiagnostic> {
        self.0.iter()
    }
}

impl fmt::Display for ManifestDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.0.len();
        writeln!(
            f,
            "invalid manifest ({count} problem{})",
            if count == 1 { "" } else { "s" }
        )?;
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {diagnostic}")?;
        }
        Ok(())
    }
}
