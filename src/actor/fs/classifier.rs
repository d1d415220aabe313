//! Attribute filesystem events to build targets.

use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

use crate::core::{Target, Targets};
use crate::manifest::Manifest;
use crate::utils::path::normalize_path;

/// A write to `path` that concerns `targets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub targets: Targets,
}

/// Declared watch paths per target, absolute and symlink-resolved.
#[derive(Debug, Clone, Default)]
pub struct WatchSet {
    entries: Vec<(Target, PathBuf)>,
}

impl WatchSet {
    pub fn new(entries: impl IntoIterator<Item = (Target, PathBuf)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(target, path)| (target, normalize_path(&path)))
                .collect(),
        }
    }

    pub fn from_manifest(manifest: &Manifest, game_root: &Path) -> Self {
        Self::new(Target::ALL.into_iter().flat_map(|target| {
            manifest
                .watch_paths(target, game_root)
                .into_iter()
                .map(move |path| (target, path))
        }))
    }

    /// Distinct paths to attach the watcher to.
    pub fn roots(&self) -> Vec<&Path> {
        let mut roots: Vec<&Path> = Vec::with_capacity(self.entries.len());
        for (_, path) in &self.entries {
            if !roots.contains(&path.as_path()) {
                roots.push(path);
            }
        }
        roots
    }

    pub fn paths(&self, target: Target) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .filter(move |(t, _)| *t == target)
            .map(|(_, p)| p.as_path())
    }

    /// Targets owning a watch path that contains `path`.
    ///
    /// Containment is per path component: `ui/src-old/a.ts` is not inside `ui/src`.
    pub fn classify(&self, path: &Path) -> Targets {
        self.entries
            .iter()
            .filter(|(_, root)| path.starts_with(root))
            .fold(Targets::empty(), |acc, (target, _)| acc | Targets::from(*target))
    }
}

/// Creations and content modifications. A rename counts through its target
/// half (`To`, or `Both` carrying old and new path), which is how atomic saves
/// land. Metadata churn, removals and the source half of a rename are not writes.
pub fn is_write(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => false,
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => true,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Classified writes carried by one notify event.
pub fn classify_event(event: &notify::Event, watch_set: &WatchSet) -> Vec<ChangeEvent> {
    if !is_write(&event.kind) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|path| !is_temp_file(path))
        .filter_map(|path| {
            let path = normalize_path(path);
            let targets = watch_set.classify(&path);
            (!targets.is_empty()).then_some(ChangeEvent { path, targets })
        })
        .collect()
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "swx" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
        || name == "4913"
}
