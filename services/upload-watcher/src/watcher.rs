//! Recursive filesystem watcher for the sync folder.
//!
//! Native notifications are reduced to a tagged [`FsEvent`] and forwarded into
//! a bounded channel so they can be handled one at a time on the runtime.

use notify::event::ModifyKind;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Errors that can occur while setting up the watcher
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to create file watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("Failed to create watch root {path}: {source}")]
    CreateRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: String,
        #[source]
        source: notify::Error,
    },
}

/// Kind of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl fmt::Display for FsEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FsEventKind::Created => "created",
            FsEventKind::Modified => "modified",
            FsEventKind::Deleted => "deleted",
            FsEventKind::Moved => "moved",
        };
        f.write_str(name)
    }
}

/// A single filesystem change for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Map a notify event kind onto the kinds we act on
pub fn classify(kind: &EventKind) -> Option<FsEventKind> {
    match kind {
        EventKind::Create(_) => Some(FsEventKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FsEventKind::Moved),
        EventKind::Modify(_) => Some(FsEventKind::Modified),
        EventKind::Remove(_) => Some(FsEventKind::Deleted),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

/// Split a notify event into one [`FsEvent`] per affected path.
///
/// Renames reported with both paths yield an event for each.
pub fn translate(event: Event) -> Vec<FsEvent> {
    match classify(&event.kind) {
        Some(kind) => event
            .paths
            .into_iter()
            .map(|path| FsEvent::new(kind, path))
            .collect(),
        None => Vec::new(),
    }
}

/// Handle to a running watcher; dropping it stops notifications
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FsWatcher {
    /// Start watching `root` recursively.
    ///
    /// Returns the watcher handle and the receiving end of the event queue.
    /// When the queue is full the notify thread blocks until the handler
    /// catches up, so no event is lost.
    pub fn start(
        root: impl AsRef<Path>,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<FsEvent>), WatchError> {
        let root = root.as_ref().to_path_buf();
        let (tx, rx) = mpsc::channel(capacity);

        let mut watcher = recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    // Runs on the notify thread, so blocking applies backpressure
                    for fs_event in translate(event) {
                        if tx.blocking_send(fs_event).is_err() {
                            debug!("Event queue closed, dropping filesystem event");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "File watcher error");
                }
            }
        })
        .map_err(WatchError::Create)?;

        if !root.exists() {
            std::fs::create_dir_all(&root).map_err(|source| WatchError::CreateRoot {
                path: root.display().to_string(),
                source,
            })?;
        }

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Watch {
                path: root.display().to_string(),
                source,
            })?;

        info!(root = %root.display(), "Started watching sync folder");

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
