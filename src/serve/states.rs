//! Save states stored as JSON files under `<game root>/.save-states`.

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::replay::SaveStateData;

pub const SAVE_STATES_DIR: &str = ".save-states";

/// One entry of `GET /states`. `ctime` is the modification time in Unix ms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveStateEntry {
    pub name: String,
    pub ctime: i64,
}

#[derive(Debug, Serialize)]
pub struct SaveStateListing {
    pub entries: Vec<SaveStateEntry>,
}

pub struct SaveStateStore {
    dir: PathBuf,
}

impl SaveStateStore {
    /// Create the directory if needed (owner-only on unix).
    pub fn open(game_root: &Path) -> Result<Self> {
        let dir = game_root.join(SAVE_STATES_DIR);
        create_private_dir(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stored states, sorted by name.
    pub fn list(&self) -> Result<Vec<SaveStateEntry>> {
        let read_dir = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read {}", self.dir.display()))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let modified = entry.metadata()?.modified()?;
            let ctime = modified
                .duration_since(UNIX_EPOCH)
                .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
                .unwrap_or(0);
            entries.push(SaveStateEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                ctime,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// `None` when no state with that name exists.
    pub fn load(&self, name: &str) -> Result<Option<SaveStateData>> {
        let path = self.dir.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        };
        let save = serde_json::from_str(&text)
            .with_context(|| format!("invalid save state {}", path.display()))?;
        Ok(Some(save))
    }

    /// Store `body` as-is, replacing any state with the same name.
    pub fn store(&self, name: &str, body: &[u8]) -> Result<()> {
        let path = self.dir.join(name);
        let mut file = create_private_file(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.write_all(body)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Returns `false` when there was nothing to remove.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let path = self.dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}

/// Percent-decode a `{name}` path segment and check that it names a plain
/// file inside the store.
pub fn decode_name(raw: &str) -> Result<String, String> {
    let name = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| "save state name is not valid UTF-8".to_string())?;

    if name.is_empty() || name == "." || name == ".." {
        return Err(format!("invalid save state name `{name}`"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(format!("save state name `{name}` must not contain path separators"));
    }
    Ok(name.into_owned())
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn create_private_file(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}
