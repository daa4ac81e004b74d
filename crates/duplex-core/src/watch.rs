//! Continuous rebuilds.
//!
//! A [`WatchSession`] purges its pipeline's output once, compiles, and then
//! recompiles on every change batch from its [`ChangeFeed`]. The first result
//! completes the session's ready signal; every later one is broadcast and
//! handed to the session's [`RebuildHook`]s. Rebuilds of one pipeline never
//! overlap: batches that arrive while a compile is running are merged into
//! the next one.

use duplex_config::{PipelineDescriptor, PipelineKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::build::BuildRunner;
use crate::compiler::BuildResult;
use crate::error::CoreError;
use crate::watcher::{ChangeBatch, ChangeFeed, WatchEvent};

const RESULT_CAPACITY: usize = 16;

/// Reacts to rebuilds after the initial compile of a session.
///
/// Hooks run on the session task and must not block; anything slow should be
/// handed off (a supervisor restart is a fire-and-forget message).
pub trait RebuildHook: Send + Sync {
    fn rebuilt(&self, result: &BuildResult);
}

#[derive(Clone)]
pub struct WatchRunner {
    runner: BuildRunner,
}

impl WatchRunner {
    pub fn new(runner: BuildRunner) -> Self {
        Self { runner }
    }

    /// Start a session for `descriptor`. Must be called within a tokio runtime.
    pub fn watch(
        &self,
        descriptor: PipelineDescriptor,
        feed: ChangeFeed,
        hooks: Vec<Arc<dyn RebuildHook>>,
    ) -> WatchSession {
        let pipeline = descriptor.kind();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (results, _) = broadcast::channel(RESULT_CAPACITY);
        let degraded = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_session(SessionTask {
            runner: self.runner.clone(),
            descriptor,
            feed,
            hooks,
            ready: Some(ready_tx),
            results: results.clone(),
            degraded: Arc::clone(&degraded),
        }));

        WatchSession {
            pipeline,
            ready: Some(ready_rx),
            results,
            degraded,
            task,
        }
    }
}

/// A running watch session. Dropping it stops the session.
pub struct WatchSession {
    pipeline: PipelineKind,
    ready: Option<oneshot::Receiver<BuildResult>>,
    results: broadcast::Sender<BuildResult>,
    degraded: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WatchSession {
    pub fn pipeline(&self) -> PipelineKind {
        self.pipeline
    }

    /// Resolves with the session's first result, exactly once.
    ///
    /// Later calls return `None`, as does a session whose task died before
    /// producing anything.
    pub async fn ready(&mut self) -> Option<BuildResult> {
        let rx = self.ready.take()?;
        rx.await.ok()
    }

    /// Results produced after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildResult> {
        self.results.subscribe()
    }

    /// Whether the filesystem watch broke during this session.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct SessionTask {
    runner: BuildRunner,
    descriptor: PipelineDescriptor,
    feed: ChangeFeed,
    hooks: Vec<Arc<dyn RebuildHook>>,
    ready: Option<oneshot::Sender<BuildResult>>,
    results: broadcast::Sender<BuildResult>,
    degraded: Arc<AtomicBool>,
}

impl SessionTask {
    fn publish(&mut self, result: BuildResult) {
        // No subscribers is fine.
        let _ = self.results.send(result.clone());

        if let Some(ready) = self.ready.take() {
            let _ = ready.send(result);
            return;
        }
        for hook in &self.hooks {
            hook.rebuilt(&result);
        }
    }

    fn mark_degraded(&self, message: &str) {
        self.degraded.store(true, Ordering::Release);
        let error = CoreError::WatchIo {
            path: self
                .descriptor
                .sources()
                .first()
                .cloned()
                .unwrap_or_else(PathBuf::new),
            source: notify::Error::generic(message),
        };
        self.runner
            .reporter()
            .watch_degraded(self.descriptor.kind(), &error);
    }

    /// Wait for the next batch, merging whatever else is already queued.
    async fn next_batch(&mut self) -> Option<ChangeBatch> {
        let mut batch = loop {
            match self.feed.next().await? {
                WatchEvent::Changed(batch) => break batch,
                WatchEvent::Failed(message) => self.mark_degraded(&message),
            }
        };
        while let Some(event) = self.feed.try_next() {
            match event {
                WatchEvent::Changed(more) => batch.merge(more),
                WatchEvent::Failed(message) => self.mark_degraded(&message),
            }
        }
        Some(batch)
    }
}

async fn run_session(mut task: SessionTask) {
    let pipeline = task.descriptor.kind();

    task.runner.clean(&task.descriptor).await;
    let first = task.runner.compile(&task.descriptor, 0).await;
    task.publish(first);

    let mut sequence = 0;
    while let Some(batch) = task.next_batch().await {
        sequence += 1;
        tracing::info!(pipeline = %pipeline, files = batch.len(), sequence, "change detected, rebuilding");
        let result = task.runner.compile(&task.descriptor, sequence).await;
        task.publish(result);
    }

    // Watch mode only ends with the process.
    tracing::warn!(pipeline = %pipeline, "change feed closed, no further rebuilds");
    std::future::pending::<()>().await;
}
