//! Task graph and run-wide shutdown.
//!
//! | task             | does                                                    |
//! |------------------|---------------------------------------------------------|
//! | `clean-frontend` | purge the frontend output                               |
//! | `clean-backend`  | purge the backend output                                |
//! | `frontend-build` | purge, compile the frontend once                        |
//! | `backend-build`  | purge, compile the backend once                         |
//! | `build`          | both cleans, then both compiles in parallel             |
//! | `frontend-watch` | frontend watch session                                  |
//! | `backend-watch`  | backend watch session                                   |
//! | `watch`          | both sessions; once both are ready, start the backend   |
//! | `run`            | `build`, then hand the backend to the production wrapper |

use duplex_config::{
    DescriptorBuilder, PipelineDescriptor, PipelineKind, Pipelines, ProjectConfig, RunConfig,
};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::build::BuildRunner;
use crate::compiler::{BuildResult, Compiler};
use crate::error::{CoreError, Result};
use crate::reporter::{Reporter, ServerStatus};
use crate::supervisor::{
    CommandLauncher, ProcessLauncher, RestartOnRebuild, RestartPolicy, SupervisorHandle,
};
use crate::watch::{RebuildHook, WatchRunner, WatchSession};
use crate::watcher::{ChangeFeed, FileWatcher, IgnoreRules, DEBOUNCE};
use crate::wrapper::{script_path, ProductionWrapper, WrapperExit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    CleanFrontend,
    CleanBackend,
    FrontendBuild,
    BackendBuild,
    Build,
    FrontendWatch,
    BackendWatch,
    Watch,
    Run,
}

impl Task {
    pub const ALL: [Task; 9] = [
        Task::CleanFrontend,
        Task::CleanBackend,
        Task::FrontendBuild,
        Task::BackendBuild,
        Task::Build,
        Task::FrontendWatch,
        Task::BackendWatch,
        Task::Watch,
        Task::Run,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Task::CleanFrontend => "clean-frontend",
            Task::CleanBackend => "clean-backend",
            Task::FrontendBuild => "frontend-build",
            Task::BackendBuild => "backend-build",
            Task::Build => "build",
            Task::FrontendWatch => "frontend-watch",
            Task::BackendWatch => "backend-watch",
            Task::Watch => "watch",
            Task::Run => "run",
        }
    }

    /// Watch tasks switch the run into watch mode.
    pub fn is_watch(self) -> bool {
        matches!(self, Task::FrontendWatch | Task::BackendWatch | Task::Watch)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Task::ALL
            .into_iter()
            .find(|task| task.name() == s)
            .ok_or_else(|| format!("unknown task '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task: Task,
    /// Results of one-shot builds; watch tasks only carry their first results.
    pub results: Vec<BuildResult>,
    pub exit_code: i32,
}

impl TaskOutcome {
    fn new(task: Task, results: Vec<BuildResult>) -> Self {
        let exit_code = if results.iter().all(BuildResult::is_success) {
            0
        } else {
            1
        };
        Self {
            task,
            results,
            exit_code,
        }
    }

    /// Interrupts end a task with exit code 0.
    fn interrupted(task: Task) -> Self {
        Self {
            task,
            results: Vec::new(),
            exit_code: 0,
        }
    }

    fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn failed_pipelines(&self) -> Vec<PipelineKind> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.pipeline)
            .collect()
    }
}

/// Fires once, when the run is interrupted.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx: Arc::new(tx) }, Shutdown { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the trigger fired; never resolves if it is dropped unfired.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

static INTERRUPT_HANDLER: AtomicBool = AtomicBool::new(false);

/// Route the first Ctrl+C of the process to `trigger`.
///
/// Installs at most one handler per process; returns `false` when one was
/// already installed. Must be called within a tokio runtime.
pub fn install_interrupt_handler(trigger: ShutdownTrigger) -> bool {
    if INTERRUPT_HANDLER.swap(true, Ordering::SeqCst) {
        return false;
    }
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, shutting down");
                trigger.trigger();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for interrupts"),
        }
    });
    true
}

/// Where watch sessions get their change batches from.
pub trait ChangeSource: Send + Sync {
    fn subscribe(&self, descriptor: &PipelineDescriptor) -> Result<ChangeFeed>;
}

/// Recursive `notify` watches on each pipeline's source roots.
#[derive(Debug, Clone)]
pub struct NotifyChangeSource {
    ignore: IgnoreRules,
    debounce: Duration,
}

impl NotifyChangeSource {
    pub fn new(ignore: IgnoreRules) -> Self {
        Self {
            ignore,
            debounce: DEBOUNCE,
        }
    }
}

impl ChangeSource for NotifyChangeSource {
    fn subscribe(&self, descriptor: &PipelineDescriptor) -> Result<ChangeFeed> {
        FileWatcher::watch(descriptor.sources().to_vec(), self.ignore.clone(), self.debounce)
    }
}

/// Owns everything a run needs and executes tasks.
pub struct Lifecycle {
    root: PathBuf,
    run: Arc<RunConfig>,
    project: Arc<ProjectConfig>,
    pipelines: Pipelines,
    runner: BuildRunner,
    changes: Arc<dyn ChangeSource>,
    launcher: Arc<dyn ProcessLauncher>,
    frontend_hooks: Vec<Arc<dyn RebuildHook>>,
}

impl Lifecycle {
    /// Build the descriptors for this run. A malformed descriptor is fatal.
    pub fn new(
        root: impl Into<PathBuf>,
        run: Arc<RunConfig>,
        project: Arc<ProjectConfig>,
        compiler: Arc<dyn Compiler>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        let root = root.into();
        let pipelines = DescriptorBuilder::new(&root, &run, &project).pipelines()?;

        let ignore = IgnoreRules::new([
            pipelines.frontend.output_dir().to_path_buf(),
            pipelines.backend.output_dir().to_path_buf(),
            root.join(&project.modules_dir),
            root.join(&project.state_dir),
        ]);
        let launcher = server_launcher(&root, &project, &pipelines.backend, &run)?;

        Ok(Self {
            runner: BuildRunner::new(compiler, reporter),
            changes: Arc::new(NotifyChangeSource::new(ignore)),
            launcher: Arc::new(launcher),
            frontend_hooks: Vec::new(),
            root,
            run,
            project,
            pipelines,
        })
    }

    pub fn with_change_source(mut self, changes: Arc<dyn ChangeSource>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Observe frontend rebuilds, e.g. to tell browsers to reload.
    pub fn with_frontend_hook(mut self, hook: Arc<dyn RebuildHook>) -> Self {
        self.frontend_hooks.push(hook);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    pub fn pipelines(&self) -> &Pipelines {
        &self.pipelines
    }

    fn reporter(&self) -> &Arc<dyn Reporter> {
        self.runner.reporter()
    }

    pub async fn execute(&self, task: Task, shutdown: Shutdown) -> Result<TaskOutcome> {
        tracing::debug!(task = %task, mode = %self.run.mode(), "executing task");
        match task {
            Task::CleanFrontend => {
                interruptible(task, shutdown, self.clean(task, PipelineKind::Frontend)).await
            }
            Task::CleanBackend => {
                interruptible(task, shutdown, self.clean(task, PipelineKind::Backend)).await
            }
            Task::FrontendBuild => {
                interruptible(task, shutdown, self.build_one(task, PipelineKind::Frontend)).await
            }
            Task::BackendBuild => {
                interruptible(task, shutdown, self.build_one(task, PipelineKind::Backend)).await
            }
            Task::Build => interruptible(task, shutdown, async { Ok(self.build_all().await) }).await,
            Task::FrontendWatch => self.watch_one(task, PipelineKind::Frontend, shutdown).await,
            Task::BackendWatch => self.watch_one(task, PipelineKind::Backend, shutdown).await,
            Task::Watch => self.watch_all(shutdown).await,
            Task::Run => self.run(shutdown).await,
        }
    }

    async fn clean(&self, task: Task, pipeline: PipelineKind) -> Result<TaskOutcome> {
        self.runner.clean(self.pipelines.get(pipeline)).await;
        Ok(TaskOutcome::new(task, Vec::new()))
    }

    async fn build_one(&self, task: Task, pipeline: PipelineKind) -> Result<TaskOutcome> {
        let result = self.runner.build(self.pipelines.get(pipeline)).await;
        Ok(TaskOutcome::new(task, vec![result]))
    }

    /// Both purges, then both compiles; completes once both have reported.
    pub async fn build_all(&self) -> TaskOutcome {
        let (frontend, backend) = (&self.pipelines.frontend, &self.pipelines.backend);
        tokio::join!(self.runner.clean(frontend), self.runner.clean(backend));
        let (frontend, backend) = tokio::join!(
            self.runner.compile(frontend, 0),
            self.runner.compile(backend, 0)
        );
        TaskOutcome::new(Task::Build, vec![frontend, backend])
    }

    fn session(&self, pipeline: PipelineKind, hooks: Vec<Arc<dyn RebuildHook>>) -> WatchSession {
        let descriptor = self.pipelines.get(pipeline);
        let feed = match self.changes.subscribe(descriptor) {
            Ok(feed) => feed,
            Err(e) => {
                self.reporter().watch_degraded(pipeline, &e);
                ChangeFeed::closed()
            }
        };
        WatchRunner::new(self.runner.clone()).watch(descriptor.clone(), feed, hooks)
    }

    async fn watch_one(
        &self,
        task: Task,
        pipeline: PipelineKind,
        mut shutdown: Shutdown,
    ) -> Result<TaskOutcome> {
        let hooks = match pipeline {
            PipelineKind::Frontend => self.frontend_hooks.clone(),
            PipelineKind::Backend => Vec::new(),
        };
        let mut session = self.session(pipeline, hooks);

        let first = tokio::select! {
            first = session.ready() => first,
            _ = shutdown.wait() => None,
        };
        if first.is_some() {
            tracing::info!(pipeline = %pipeline, "watching for changes");
            shutdown.wait().await;
        }

        session.stop();
        Ok(TaskOutcome::new(task, first.into_iter().collect()).with_exit_code(0))
    }

    async fn watch_all(&self, mut shutdown: Shutdown) -> Result<TaskOutcome> {
        let supervisor = SupervisorHandle::spawn(Arc::clone(&self.launcher), Arc::clone(self.reporter()));
        let restart: Arc<dyn RebuildHook> = Arc::new(RestartOnRebuild::new(
            supervisor.clone(),
            RestartPolicy::from_flag(self.project.server.restart_on_failed_build),
        ));

        let mut frontend = self.session(PipelineKind::Frontend, self.frontend_hooks.clone());
        let mut backend = self.session(PipelineKind::Backend, vec![restart]);

        let ready = tokio::select! {
            (f, b) = async { tokio::join!(frontend.ready(), backend.ready()) } => Some((f, b)),
            _ = shutdown.wait() => None,
        };

        let mut results = Vec::new();
        if let Some((f, b)) = ready {
            results.extend(f);
            results.extend(b);
            tracing::info!("initial compile finished for both pipelines");

            // A launch failure is reported by the supervisor; the session
            // goes on and the next backend rebuild retries.
            if let Err(e) = supervisor.start().await {
                tracing::debug!(error = %e, "server did not start");
            }
            shutdown.wait().await;
        }

        supervisor.stop().await;
        frontend.stop();
        backend.stop();
        Ok(TaskOutcome::new(Task::Watch, results).with_exit_code(0))
    }

    async fn run(&self, mut shutdown: Shutdown) -> Result<TaskOutcome> {
        let built = tokio::select! {
            biased;
            _ = shutdown.wait() => {
                tracing::info!("interrupted while building, the server was not started");
                return Ok(TaskOutcome::interrupted(Task::Run));
            }
            built = self.build_all() => built,
        };
        if shutdown.is_triggered() {
            return Ok(TaskOutcome::interrupted(Task::Run));
        }
        if built.exit_code != 0 {
            tracing::error!(failed = ?built.failed_pipelines(), "build failed, not starting the server");
            return Ok(TaskOutcome {
                task: Task::Run,
                ..built
            });
        }

        let wrapper =
            ProductionWrapper::new(&self.root, &self.project.server, &self.pipelines.backend, &self.run)?;
        let exit_code = match wrapper.run(shutdown.clone()).await? {
            WrapperExit::Exited(code) => {
                self.reporter().server_status(&ServerStatus::Exited { code });
                code.unwrap_or(1)
            }
            WrapperExit::Interrupted => 0,
        };
        Ok(TaskOutcome {
            task: Task::Run,
            results: built.results,
            exit_code,
        })
    }
}

/// Run `work` until it finishes or the run is interrupted.
///
/// Dropping `work` drops any compiler invocation in flight, which kills the
/// compiler process.
async fn interruptible<F>(task: Task, mut shutdown: Shutdown, work: F) -> Result<TaskOutcome>
where
    F: Future<Output = Result<TaskOutcome>>,
{
    tokio::select! {
        biased;
        _ = shutdown.wait() => {
            tracing::info!(task = %task, "interrupted");
            Ok(TaskOutcome::interrupted(task))
        }
        outcome = work => outcome,
    }
}

fn server_launcher(
    root: &Path,
    project: &ProjectConfig,
    backend: &PipelineDescriptor,
    run: &RunConfig,
) -> Result<CommandLauncher> {
    let script = script_path(backend, &project.server.script);
    let launcher = CommandLauncher::from_command_line(&project.server.command, root).ok_or_else(|| {
        CoreError::Configuration(duplex_config::ConfigError::InvalidValue {
            field: "server.command".to_string(),
            hint: Some("the server command cannot be empty".to_string()),
        })
    })?;
    Ok(launcher
        .arg(script.display().to_string())
        .env("PORT", run.ports.http_server.to_string())
        .env("NODE_ENV", run.mode().node_env()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_names_round_trip() {
        for task in Task::ALL {
            assert_eq!(task.name().parse::<Task>().unwrap(), task);
        }
        assert!("beautify-js".parse::<Task>().is_err());
    }

    #[test]
    fn only_watch_tasks_are_watch() {
        let watch: Vec<_> = Task::ALL.into_iter().filter(|t| t.is_watch()).collect();
        assert_eq!(
            watch,
            [Task::FrontendWatch, Task::BackendWatch, Task::Watch]
        );
    }

    #[tokio::test]
    async fn shutdown_wait_resolves_after_trigger() {
        let (trigger, mut shutdown) = Shutdown::new();
        assert!(!shutdown.is_triggered());
        trigger.trigger();
        shutdown.wait().await;
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn interrupt_handler_installs_once() {
        let (trigger, _shutdown) = Shutdown::new();
        install_interrupt_handler(trigger.clone());
        assert!(!install_interrupt_handler(trigger));
    }
}
