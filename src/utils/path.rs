//! Filesystem path normalization.

use std::path::{Component, Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// When the path does not exist (e.g. a file that was just removed), the
/// longest existing ancestor is canonicalized and the rest is re-attached,
/// so paths under a symlinked directory still compare equal to their watch root.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };
    let absolute = clean(&absolute);

    let mut tail = Vec::new();
    let mut ancestor = absolute.as_path();
    while let Some(parent) = ancestor.parent() {
        if let Some(name) = ancestor.file_name() {
            tail.push(name.to_os_string());
        }
        if let Ok(mut resolved) = parent.canonicalize() {
            resolved.extend(tail.iter().rev());
            return resolved;
        }
        ancestor = parent;
    }
    absolute
}

/// Lexically drop `.` and resolve `..` components.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
