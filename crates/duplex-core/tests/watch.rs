mod support;

use duplex_config::{DescriptorBuilder, PipelineKind, ProjectConfig, RunConfig};
use duplex_core::{
    BuildResult, BuildRunner, ChangeBatch, ChangeFeed, RebuildHook, ServerStatus, Shutdown, Task,
    TaskOutcome, WatchEvent, WatchRunner,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use support::{eventually, Harness};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn watch_run() -> RunConfig {
    RunConfig::development().with_watch(true)
}

fn spawn_task(
    harness: &Harness,
    task: Task,
    project: ProjectConfig,
    shutdown: Shutdown,
) -> JoinHandle<duplex_core::Result<TaskOutcome>> {
    let lifecycle = harness.lifecycle_with(watch_run(), project);
    tokio::spawn(async move { lifecycle.execute(task, shutdown).await })
}

#[tokio::test]
async fn server_starts_only_after_both_initial_compiles() {
    let harness = Harness::new();
    harness.compiler.gate(PipelineKind::Backend);
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(&harness, Task::Watch, ProjectConfig::default(), shutdown);

    eventually(|| harness.compiler.count(PipelineKind::Frontend) == 1).await;

    // Frontend rebuilds before the backend is ready do not start anything.
    harness.changes.touch(PipelineKind::Frontend, "src/website/app.js");
    eventually(|| harness.compiler.count(PipelineKind::Frontend) == 2).await;
    harness.changes.touch(PipelineKind::Frontend, "src/website/styles.css");
    eventually(|| harness.compiler.count(PipelineKind::Frontend) == 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.launcher.launches(), 0);
    assert_eq!(harness.compiler.count(PipelineKind::Backend), 0);

    harness.compiler.release(PipelineKind::Backend);
    eventually(|| harness.launcher.launches() == 1).await;
    assert_eq!(harness.reporter.statuses()[0], ServerStatus::Starting);

    trigger.trigger();
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.results.len(), 2);
}

#[tokio::test]
async fn failed_initial_compile_still_counts_as_ready() {
    let harness = Harness::new();
    harness.compiler.fail(PipelineKind::Backend);
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(&harness, Task::Watch, ProjectConfig::default(), shutdown);

    eventually(|| harness.launcher.launches() == 1).await;

    trigger.trigger();
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.exit_code, 0);
}

#[tokio::test]
async fn backend_rebuild_restarts_the_server() {
    let harness = Harness::new();
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(&harness, Task::Watch, ProjectConfig::default(), shutdown);

    eventually(|| harness.launcher.launches() == 1).await;
    harness.changes.touch(PipelineKind::Backend, "src/server/routes.js");
    eventually(|| harness.launcher.launches() == 2).await;

    assert_eq!(harness.launcher.max_live(), 1);
    let statuses = harness.reporter.statuses();
    assert!(statuses.contains(&ServerStatus::Restarting));

    let rebuilt = harness.reporter.results_for(PipelineKind::Backend);
    assert_eq!(
        rebuilt.iter().map(|r| r.sequence).collect::<Vec<_>>(),
        [0, 1]
    );

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn frontend_rebuild_does_not_restart_the_server() {
    let harness = Harness::new();
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(&harness, Task::Watch, ProjectConfig::default(), shutdown);

    eventually(|| harness.launcher.launches() == 1).await;
    harness.changes.touch(PipelineKind::Frontend, "src/website/app.js");
    eventually(|| harness.compiler.count(PipelineKind::Frontend) == 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.launcher.launches(), 1);

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn failed_rebuild_restarts_by_default() {
    let harness = Harness::new();
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(&harness, Task::Watch, ProjectConfig::default(), shutdown);

    eventually(|| harness.launcher.launches() == 1).await;
    harness.compiler.fail(PipelineKind::Backend);
    harness.changes.touch(PipelineKind::Backend, "src/server/routes.js");
    eventually(|| harness.launcher.launches() == 2).await;

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn failed_rebuild_keeps_server_when_restart_on_failure_is_off() {
    let harness = Harness::new();
    let mut project = ProjectConfig::default();
    project.server.restart_on_failed_build = false;
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(&harness, Task::Watch, project, shutdown);

    eventually(|| harness.launcher.launches() == 1).await;
    harness.compiler.fail(PipelineKind::Backend);
    harness.changes.touch(PipelineKind::Backend, "src/server/routes.js");
    eventually(|| harness.compiler.count(PipelineKind::Backend) == 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.launcher.launches(), 1);
    assert_eq!(harness.launcher.live(), 1);

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn interrupt_stops_the_server_and_exits_zero() {
    let harness = Harness::new();
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(&harness, Task::Watch, ProjectConfig::default(), shutdown);

    eventually(|| harness.launcher.launches() == 1).await;
    assert_eq!(harness.launcher.live(), 1);

    trigger.trigger();
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(harness.launcher.live(), 0);
    assert_eq!(
        harness.reporter.statuses().last(),
        Some(&ServerStatus::Stopped)
    );
}

#[tokio::test]
async fn interrupt_before_ready_never_launches() {
    let harness = Harness::new();
    harness.compiler.gate(PipelineKind::Backend);
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(&harness, Task::Watch, ProjectConfig::default(), shutdown);

    eventually(|| harness.compiler.count(PipelineKind::Frontend) == 1).await;
    trigger.trigger();

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(harness.launcher.launches(), 0);
}

#[tokio::test]
async fn crashed_server_is_relaunched_by_next_rebuild() {
    let harness = Harness::new();
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(&harness, Task::Watch, ProjectConfig::default(), shutdown);

    eventually(|| harness.launcher.launches() == 1).await;
    harness.launcher.crash_latest(1);
    eventually(|| {
        harness
            .reporter
            .statuses()
            .contains(&ServerStatus::Exited { code: Some(1) })
    })
    .await;
    assert_eq!(harness.launcher.live(), 0);

    harness.changes.touch(PipelineKind::Backend, "src/server/routes.js");
    eventually(|| harness.launcher.live() == 1).await;
    assert_eq!(harness.launcher.launches(), 2);

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn broken_watch_is_reported_and_session_continues() {
    let harness = Harness::new();
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(
        &harness,
        Task::FrontendWatch,
        ProjectConfig::default(),
        shutdown,
    );

    eventually(|| harness.compiler.count(PipelineKind::Frontend) == 1).await;
    harness
        .changes
        .fail(PipelineKind::Frontend, "inotify watch limit reached");
    harness.changes.touch(PipelineKind::Frontend, "src/website/app.js");
    eventually(|| harness.compiler.count(PipelineKind::Frontend) == 2).await;
    assert_eq!(
        *harness.reporter.degraded.lock(),
        [PipelineKind::Frontend]
    );

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn single_pipeline_watch_starts_no_server() {
    let harness = Harness::new();
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(
        &harness,
        Task::BackendWatch,
        ProjectConfig::default(),
        shutdown,
    );

    eventually(|| harness.compiler.count(PipelineKind::Backend) == 1).await;
    harness.changes.touch(PipelineKind::Backend, "src/server/routes.js");
    eventually(|| harness.compiler.count(PipelineKind::Backend) == 2).await;
    assert_eq!(harness.launcher.launches(), 0);
    assert!(!harness.changes.is_watching(PipelineKind::Frontend));

    trigger.trigger();
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.results.len(), 1);
}

#[derive(Default)]
struct RecordingHook {
    sequences: Mutex<Vec<u64>>,
}

impl RebuildHook for RecordingHook {
    fn rebuilt(&self, result: &BuildResult) {
        self.sequences.lock().push(result.sequence);
    }
}

#[tokio::test]
async fn frontend_hooks_only_see_rebuilds() {
    let harness = Harness::new();
    let hook = Arc::new(RecordingHook::default());
    let lifecycle = harness
        .lifecycle(watch_run())
        .with_frontend_hook(hook.clone());
    let (trigger, shutdown) = Shutdown::new();
    let task =
        tokio::spawn(async move { lifecycle.execute(Task::FrontendWatch, shutdown).await });

    eventually(|| harness.compiler.count(PipelineKind::Frontend) == 1).await;
    assert!(hook.sequences.lock().is_empty());

    harness.changes.touch(PipelineKind::Frontend, "src/website/a.js");
    eventually(|| hook.sequences.lock().len() == 1).await;
    harness.changes.touch(PipelineKind::Frontend, "src/website/b.js");
    eventually(|| hook.sequences.lock().len() == 2).await;
    assert_eq!(*hook.sequences.lock(), [1, 2]);

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn watch_purges_both_outputs_before_the_first_compile() {
    let harness = Harness::new();
    harness.seed_stale_output(PipelineKind::Frontend);
    harness.seed_stale_output(PipelineKind::Backend);
    let (trigger, shutdown) = Shutdown::new();
    let task = spawn_task(&harness, Task::Watch, ProjectConfig::default(), shutdown);

    eventually(|| harness.launcher.launches() == 1).await;
    let calls = harness.compiler.calls();
    for pipeline in PipelineKind::ALL {
        let first = calls.iter().find(|c| c.pipeline == pipeline).unwrap();
        assert!(first.output_was_empty, "{} output was not purged", pipeline);
        assert!(!harness.output_dir(pipeline).join("stale.js").exists());
    }

    // Rebuilds compile over the previous output.
    harness.changes.touch(PipelineKind::Frontend, "src/website/app.js");
    eventually(|| harness.compiler.count(PipelineKind::Frontend) == 2).await;
    let rebuild = harness
        .compiler
        .calls()
        .into_iter()
        .rev()
        .find(|c| c.pipeline == PipelineKind::Frontend)
        .unwrap();
    assert!(!rebuild.output_was_empty);

    trigger.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn session_is_marked_degraded_when_its_watch_breaks() {
    let harness = Harness::new();
    let run = watch_run();
    let project = ProjectConfig::default();
    let descriptor = DescriptorBuilder::new(harness.root(), &run, &project)
        .pipelines()
        .unwrap()
        .backend;
    let runner = BuildRunner::new(harness.compiler.clone(), harness.reporter.clone());

    let (tx, rx) = mpsc::channel(8);
    let mut session =
        WatchRunner::new(runner).watch(descriptor, ChangeFeed::from_channel(rx), Vec::new());
    assert!(session.ready().await.unwrap().is_initial());
    assert!(!session.is_degraded());

    tx.send(WatchEvent::Failed("watched directory was removed".to_string()))
        .await
        .unwrap();
    eventually(|| session.is_degraded()).await;
    assert_eq!(*harness.reporter.degraded.lock(), [PipelineKind::Backend]);

    // Batches that still arrive are rebuilt.
    let mut results = session.subscribe();
    tx.send(WatchEvent::Changed(ChangeBatch::new([PathBuf::from("src/server/index.js")])))
        .await
        .unwrap();
    let rebuilt = tokio::time::timeout(Duration::from_secs(5), results.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rebuilt.sequence, 1);
    assert!(session.is_degraded());
}
