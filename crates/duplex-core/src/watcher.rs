//! Filesystem watcher with a fixed debounce window.
//!
//! Raw `notify` events are filtered (hidden files, output directories and the
//! modules directory are never interesting) and coalesced: every event that
//! arrives within [`DEBOUNCE`] of the first one ends up in the same
//! [`ChangeBatch`].

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{CoreError, Result};

/// Coalescing window for rapid successive filesystem events.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

const FEED_CAPACITY: usize = 64;

/// Paths changed within one debounce window, sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    paths: BTreeSet<PathBuf>,
}

impl ChangeBatch {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn merge(&mut self, other: ChangeBatch) {
        self.paths.extend(other.paths);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Changed(ChangeBatch),
    /// The watch broke; no re-establishment is attempted.
    Failed(String),
}

/// What the watcher must never report.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    dirs: Vec<PathBuf>,
}

impl IgnoreRules {
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            dirs: dirs.into_iter().collect(),
        }
    }

    /// Whether `path` should be dropped, given the watched `roots`.
    pub fn ignores(&self, path: &Path, roots: &[PathBuf]) -> bool {
        let Some(rel) = roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
        else {
            return true;
        };

        let hidden = rel.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
        });
        if hidden {
            return true;
        }

        self.dirs.iter().any(|dir| path.starts_with(dir))
    }
}

/// A stream of watch events for one pipeline.
///
/// The feed owns whatever produces its events, so dropping it stops the
/// underlying watcher.
pub struct ChangeFeed {
    events: mpsc::Receiver<WatchEvent>,
    _watcher: Option<FileWatcher>,
}

impl ChangeFeed {
    /// A feed driven by an arbitrary channel.
    pub fn from_channel(events: mpsc::Receiver<WatchEvent>) -> Self {
        Self {
            events,
            _watcher: None,
        }
    }

    /// An already closed feed, for sessions whose watch could not be set up.
    pub fn closed() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self::from_channel(rx)
    }

    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Non-blocking poll for an already queued event.
    pub fn try_next(&mut self) -> Option<WatchEvent> {
        self.events.try_recv().ok()
    }
}

pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

impl FileWatcher {
    /// Watch `roots` recursively and return a debounced feed.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`CoreError::WatchIo`] when a root is missing or cannot be watched.
    pub fn watch(roots: Vec<PathBuf>, ignore: IgnoreRules, debounce: Duration) -> Result<ChangeFeed> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The receiver only goes away when the feed is dropped.
            let _ = raw_tx.send(res);
        })
        .map_err(|source| CoreError::WatchIo {
            path: roots.first().cloned().unwrap_or_default(),
            source,
        })?;

        for root in &roots {
            if !root.exists() {
                return Err(CoreError::WatchIo {
                    path: root.clone(),
                    source: notify::Error::path_not_found().add_path(root.clone()),
                });
            }
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|source| CoreError::WatchIo {
                    path: root.clone(),
                    source,
                })?;
            tracing::debug!(root = %root.display(), "watching");
        }

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        tokio::spawn(debounce_loop(raw_rx, tx, roots.clone(), ignore, debounce));

        Ok(ChangeFeed {
            events: rx,
            _watcher: Some(FileWatcher {
                _watcher: watcher,
                roots,
            }),
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

fn relevant_paths(event: Event, roots: &[PathBuf], ignore: &IgnoreRules) -> Vec<PathBuf> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }
    event
        .paths
        .into_iter()
        .filter(|p| !ignore.ignores(p, roots))
        .collect()
}

async fn debounce_loop(
    mut raw: mpsc::UnboundedReceiver<notify::Result<Event>>,
    tx: mpsc::Sender<WatchEvent>,
    roots: Vec<PathBuf>,
    ignore: IgnoreRules,
    window: Duration,
) {
    loop {
        // Wait for the first relevant event.
        let mut batch = ChangeBatch::default();
        while batch.is_empty() {
            match raw.recv().await {
                Some(Ok(event)) => batch.merge(ChangeBatch::new(relevant_paths(event, &roots, &ignore))),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "watcher error");
                    if tx.send(WatchEvent::Failed(e.to_string())).await.is_err() {
                        return;
                    }
                }
                None => return,
            }
        }

        // Coalesce everything that arrives within the window. An error ends
        // the window early; the batch collected so far is still delivered.
        let deadline = Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, raw.recv()).await {
                Ok(Some(Ok(event))) => {
                    batch.merge(ChangeBatch::new(relevant_paths(event, &roots, &ignore)))
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "watcher error");
                    if tx.send(WatchEvent::Failed(e.to_string())).await.is_err() {
                        return;
                    }
                    break;
                }
                Ok(None) | Err(_) => break,
            }
        }

        tracing::debug!(paths = batch.len(), "change batch");
        if tx.send(WatchEvent::Changed(batch)).await.is_err() {
            return;
        }
    }
}
