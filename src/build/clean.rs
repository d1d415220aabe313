//! Remove build outputs declared by the manifest.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};

use crate::log;
use crate::manifest::Manifest;

/// Empty the UI output directory (keeping it) and delete the Game bundle.
/// Outputs that do not exist are skipped.
pub fn clean(game_root: &Path, manifest: &Manifest) -> Result<()> {
    let ui_out = manifest.ui.output_path(game_root);
    match fs::read_dir(&ui_out) {
        Ok(entries) => {
            for entry in entries {
                let path = entry
                    .with_context(|| format!("failed to list {}", ui_out.display()))?
                    .path();
                let removed = if path.is_dir() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                removed.with_context(|| format!("failed to remove {}", path.display()))?;
            }
            log!("clean"; "emptied {}", ui_out.display());
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", ui_out.display())),
    }

    let bundle = manifest.bundle_path(game_root);
    match fs::remove_file(&bundle) {
        Ok(()) => log!("clean"; "removed {}", bundle.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("failed to remove {}", bundle.display())),
    }
    Ok(())
}
