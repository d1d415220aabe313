//! FileSystem Actor
//!
//! Watches the manifest's watch paths and sends debounced rebuild requests
//! to the BuildActor. Implements the "Watcher-First" pattern: the watcher is
//! attached in [`FsActor::new`], so events that happen during the initial
//! build are buffered instead of lost.
//!
//! ```text
//! notify ──► bridge thread ──► classify_event ──► Debouncer ──► BuildMsg::Rebuild
//!            (sync → async)     (ChangeEvent)      (per target)
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::messages::BuildMsg;
use crate::{debug, log};

// Event → target attribution.
mod classifier;
// Per-target timing.
mod debouncer;

#[cfg(test)]
mod tests;

pub use classifier::{ChangeEvent, WatchSet, classify_event, is_write};
use debouncer::Debouncer;

/// The watcher could not be attached. Fatal for the dev loop.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to start the file watcher")]
    Init(#[source] notify::Error),

    #[error("failed to watch `{}`", path.display())]
    Setup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// FileSystem Actor - watches for file changes
pub struct FsActor {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    watch_set: WatchSet,
    build_tx: mpsc::Sender<BuildMsg>,
    debouncer: Debouncer,
    shutdown: CancellationToken,
}

impl FsActor {
    /// Attach the watcher to every watch path.
    ///
    /// Any path that cannot be watched (missing, permission denied) fails
    /// the whole call; there is no partial watch.
    pub fn new(
        watch_set: WatchSet,
        build_tx: mpsc::Sender<BuildMsg>,
        shutdown: CancellationToken,
    ) -> Result<Self, WatchError> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })
        .map_err(WatchError::Init)?;

        for (path, mode) in attach_points(&watch_set)? {
            watcher
                .watch(&path, mode)
                .map_err(|source| WatchError::Setup {
                    path: path.clone(),
                    source,
                })?;
            debug!("watch"; "watching {}", path.display());
        }

        Ok(Self {
            notify_rx,
            watcher,
            watch_set,
            build_tx,
            debouncer: Debouncer::new(),
            shutdown,
        })
    }

    /// Override the debounce window.
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debouncer = Debouncer::with_window(window);
        self
    }

    /// Run the actor event loop until shutdown or the BuildActor is gone.
    pub async fn run(self) {
        let Self {
            notify_rx,
            watcher,
            watch_set,
            build_tx,
            mut debouncer,
            shutdown,
        } = self;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => log!("watch"; "notify error: {}", e),
                }
            }
        });

        loop {
            let sleep = debouncer.sleep_duration(Instant::now());
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                event = async_rx.recv() => {
                    let Some(event) = event else { break };
                    for change in classify_event(&event, &watch_set) {
                        debug!("watch"; "{} → {}", change.path.display(), change.targets.describe());
                        debouncer.on_change(change.targets, Instant::now());
                    }
                    if flush_due(&mut debouncer, &build_tx).await.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(sleep) => {
                    if flush_due(&mut debouncer, &build_tx).await.is_err() {
                        break;
                    }
                }
            }
        }

        // Dropping the watcher closes notify's sender and ends the bridge thread.
        drop(watcher);
        debug!("watch"; "stopped");
    }
}

/// Where to attach the watcher, and how.
///
/// Directories are watched recursively. A single file is watched through its
/// parent directory, so a save that renames a new file over it (a new inode)
/// keeps being seen; the classifier drops siblings. Parents already under a
/// recursive root are not attached twice.
fn attach_points(watch_set: &WatchSet) -> Result<Vec<(PathBuf, RecursiveMode)>, WatchError> {
    let roots = watch_set.roots();
    let dirs: Vec<&Path> = roots.iter().copied().filter(|root| root.is_dir()).collect();

    let mut points: Vec<(PathBuf, RecursiveMode)> = dirs
        .iter()
        .map(|dir| (dir.to_path_buf(), RecursiveMode::Recursive))
        .collect();

    for file in roots.iter().filter(|root| !root.is_dir()) {
        let missing = || WatchError::Setup {
            path: file.to_path_buf(),
            source: notify::Error::path_not_found().add_path(file.to_path_buf()),
        };
        if !file.exists() {
            return Err(missing());
        }
        let parent = file.parent().ok_or_else(missing)?;
        let covered = dirs.iter().any(|dir| parent.starts_with(dir))
            || points.iter().any(|(path, _)| path == parent);
        if !covered {
            points.push((parent.to_path_buf(), RecursiveMode::NonRecursive));
        }
    }

    Ok(points)
}

/// Emit one rebuild per target whose window has closed.
///
/// Returns `Err(())` if the BuildActor shut down
async fn flush_due(debouncer: &mut Debouncer, build_tx: &mpsc::Sender<BuildMsg>) -> Result<(), ()> {
    for target in debouncer.take_due(Instant::now()).targets() {
        log!("watch"; "{} changed", target.label());
        build_tx
            .send(BuildMsg::Rebuild(target.into()))
            .await
            .map_err(|_| ())?;
    }
    Ok(())
}
