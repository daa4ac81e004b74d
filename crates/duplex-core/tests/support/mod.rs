//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use duplex_config::{PipelineDescriptor, PipelineKind, ProjectConfig, RunConfig};
use duplex_core::{
    BuildResult, ChangeBatch, ChangeFeed, ChangeSource, CompileError, CompileStats, Compiler,
    CoreError, Lifecycle, ProcessHandle, ProcessLauncher, Reporter, ServerStatus, WatchEvent,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot, Semaphore};

#[derive(Debug, Clone)]
pub struct Invocation {
    pub pipeline: PipelineKind,
    /// Whether the output directory was empty when the compile began.
    pub output_was_empty: bool,
}

/// Records invocations, writes a fake artifact, fails on request.
#[derive(Default)]
pub struct FakeCompiler {
    failing: Mutex<HashSet<PipelineKind>>,
    gates: Mutex<HashMap<PipelineKind, Arc<Semaphore>>>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeCompiler {
    pub fn fail(&self, pipeline: PipelineKind) {
        self.failing.lock().insert(pipeline);
    }

    /// Make compiles of `pipeline` wait for [`FakeCompiler::release`].
    pub fn gate(&self, pipeline: PipelineKind) {
        self.gates.lock().insert(pipeline, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, pipeline: PipelineKind) {
        if let Some(gate) = self.gates.lock().get(&pipeline) {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pipeline: PipelineKind) -> usize {
        self.calls.lock().iter().filter(|c| c.pipeline == pipeline).count()
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(
        &self,
        descriptor: &PipelineDescriptor,
        _config: &Value,
    ) -> Result<CompileStats, CompileError> {
        let pipeline = descriptor.kind();
        let gate = self.gates.lock().get(&pipeline).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let output_was_empty = is_empty_dir(descriptor.output_dir());
        self.calls.lock().push(Invocation {
            pipeline,
            output_was_empty,
        });

        std::fs::create_dir_all(descriptor.output_dir()).unwrap();
        std::fs::write(descriptor.output_dir().join("artifact.js"), "// built").unwrap();

        if self.failing.lock().contains(&pipeline) {
            Err(CompileError::new(pipeline, "Module not found: ./missing"))
        } else {
            Ok(CompileStats {
                report: format!("{} compiled", pipeline),
                duration: Duration::from_millis(1),
            })
        }
    }
}

/// Hands out fake processes and tracks how many are alive at once.
#[derive(Default)]
pub struct FakeLauncher {
    pub delay: Duration,
    fail: AtomicBool,
    launches: AtomicUsize,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    exits: Mutex<Vec<oneshot::Sender<Option<i32>>>>,
}

impl FakeLauncher {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Make the most recently launched process exit with `code`.
    pub fn crash_latest(&self, code: i32) {
        if let Some(tx) = self.exits.lock().pop() {
            let _ = tx.send(Some(code));
        }
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn launch(&self) -> duplex_core::Result<Box<dyn ProcessHandle>> {
        tokio::time::sleep(self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::ProcessSpawn {
                program: "node".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }

        let id = self.launches.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        self.exits.lock().push(tx);
        Ok(Box::new(FakeProcess {
            id,
            live: Arc::clone(&self.live),
            exit: Some(rx),
        }))
    }
}

pub struct FakeProcess {
    id: u32,
    live: Arc<AtomicUsize>,
    exit: Option<oneshot::Receiver<Option<i32>>>,
}

impl FakeProcess {
    fn mark_gone(&mut self) {
        if self.exit.take().is_some() {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.id)
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let code = match self.exit.as_mut() {
            Some(rx) => match rx.await {
                Ok(code) => code,
                Err(_) => std::future::pending().await,
            },
            None => std::future::pending().await,
        };
        self.mark_gone();
        Ok(code)
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.mark_gone();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub results: Mutex<Vec<BuildResult>>,
    pub statuses: Mutex<Vec<ServerStatus>>,
    pub degraded: Mutex<Vec<PipelineKind>>,
}

impl RecordingReporter {
    pub fn statuses(&self) -> Vec<ServerStatus> {
        self.statuses.lock().clone()
    }

    pub fn results_for(&self, pipeline: PipelineKind) -> Vec<BuildResult> {
        self.results
            .lock()
            .iter()
            .filter(|r| r.pipeline == pipeline)
            .cloned()
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn build_finished(&self, result: &BuildResult) {
        self.results.lock().push(result.clone());
    }

    fn server_status(&self, status: &ServerStatus) {
        self.statuses.lock().push(status.clone());
    }

    fn watch_degraded(&self, pipeline: PipelineKind, _error: &CoreError) {
        self.degraded.lock().push(pipeline);
    }
}

/// Change feeds driven by the test.
#[derive(Default)]
pub struct ChannelChangeSource {
    senders: Mutex<HashMap<PipelineKind, mpsc::Sender<WatchEvent>>>,
}

impl ChannelChangeSource {
    pub fn touch(&self, pipeline: PipelineKind, path: &str) {
        let sender = self.senders.lock().get(&pipeline).cloned();
        let sender = sender.expect("pipeline is not being watched");
        sender
            .try_send(WatchEvent::Changed(ChangeBatch::new([PathBuf::from(path)])))
            .unwrap();
    }

    pub fn fail(&self, pipeline: PipelineKind, message: &str) {
        let sender = self.senders.lock().get(&pipeline).cloned();
        sender
            .expect("pipeline is not being watched")
            .try_send(WatchEvent::Failed(message.to_string()))
            .unwrap();
    }

    pub fn is_watching(&self, pipeline: PipelineKind) -> bool {
        self.senders.lock().contains_key(&pipeline)
    }
}

impl ChangeSource for ChannelChangeSource {
    fn subscribe(&self, descriptor: &PipelineDescriptor) -> duplex_core::Result<ChangeFeed> {
        let (tx, rx) = mpsc::channel(64);
        self.senders.lock().insert(descriptor.kind(), tx);
        Ok(ChangeFeed::from_channel(rx))
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub compiler: Arc<FakeCompiler>,
    pub launcher: Arc<FakeLauncher>,
    pub changes: Arc<ChannelChangeSource>,
    pub reporter: Arc<RecordingReporter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_launcher(FakeLauncher::default())
    }

    pub fn with_launcher(launcher: FakeLauncher) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            compiler: Arc::new(FakeCompiler::default()),
            launcher: Arc::new(launcher),
            changes: Arc::new(ChannelChangeSource::default()),
            reporter: Arc::new(RecordingReporter::default()),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn output_dir(&self, pipeline: PipelineKind) -> PathBuf {
        match pipeline {
            PipelineKind::Frontend => self.root().join("build/website"),
            PipelineKind::Backend => self.root().join("build/server"),
        }
    }

    /// Leave a stale artifact from a previous run.
    pub fn seed_stale_output(&self, pipeline: PipelineKind) {
        let dir = self.output_dir(pipeline);
        std::fs::create_dir_all(dir.join("old")).unwrap();
        std::fs::write(dir.join("stale.js"), "// stale").unwrap();
        std::fs::write(dir.join("old/chunk.js"), "// stale").unwrap();
    }

    pub fn lifecycle(&self, run: RunConfig) -> Lifecycle {
        self.lifecycle_with(run, ProjectConfig::default())
    }

    pub fn lifecycle_with(&self, run: RunConfig, project: ProjectConfig) -> Lifecycle {
        Lifecycle::new(
            self.root(),
            Arc::new(run),
            Arc::new(project),
            self.compiler.clone(),
            self.reporter.clone(),
        )
        .unwrap()
        .with_change_source(self.changes.clone())
        .with_launcher(self.launcher.clone())
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
