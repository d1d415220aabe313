//! Helpers shared by the commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::manifest::{Manifest, ManifestError};
use crate::utils::path::normalize_path;
use crate::{debug, log};

/// A game root with its validated manifest.
pub struct Game {
    pub root: PathBuf,
    pub manifest: Arc<Manifest>,
}

impl Game {
    /// Resolve `root` and load its manifest. Validation problems are
    /// printed one per line before the error is returned.
    pub fn load(root: &Path) -> Result<Self> {
        let root = normalize_path(root);
        let manifest = match Manifest::load(&root) {
            Ok(manifest) => manifest,
            Err(ManifestError::Validation(diagnostics)) => {
                for diagnostic in diagnostics.iter() {
                    log!("error"; "{}", diagnostic);
                }
                return Err(ManifestError::Validation(diagnostics).into());
            }
            Err(e) => return Err(e.into()),
        };
        debug!("manifest"; "game root {}", root.display());
        Ok(Self {
            root,
            manifest: Arc::new(manifest),
        })
    }
}
