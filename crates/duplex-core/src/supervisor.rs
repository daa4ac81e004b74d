//! Backend process supervision.
//!
//! The supervisor is an actor: a single task owns the live process handle and
//! processes [`SupervisorHandle`] requests in order, so two launches can never
//! overlap. Restart requests that pile up while a restart is in progress are
//! coalesced into one.
//!
//! ```text
//!  Stopped ──start──▶ Starting ──ok──▶ Running ──restart──▶ Restarting ──ok──▶ Running
//!                        │                │                     │
//!                       err             exits                  err
//!                        ▼                ▼                     ▼
//!                   CrashedRestartPending ◀──────────────────────┘
//!                        │
//!                     restart ──▶ Restarting
//! ```

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};

use crate::compiler::BuildResult;
use crate::error::{CoreError, Result};
use crate::reporter::{Reporter, ServerStatus};
use crate::watch::RebuildHook;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Restarting,
    CrashedRestartPending,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Stopped => "stopped",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Restarting => "restarting",
            SupervisorState::CrashedRestartPending => "crashed, restart pending",
        };
        f.write_str(s)
    }
}

/// A live process owned by the supervisor.
#[async_trait]
pub trait ProcessHandle: Send {
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit on its own. Must be cancel-safe.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;

    /// Terminate the process and reap it.
    async fn kill(&mut self) -> std::io::Result<()>;
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn ProcessHandle>>;
}

/// Launches `program args...` with extra environment, stdio inherited.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: PathBuf,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: cwd.into(),
        }
    }

    /// Build a launcher from a `[program, args...]` command line.
    pub fn from_command_line(command: &[String], cwd: impl Into<PathBuf>) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), cwd).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub(crate) fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .current_dir(&self.cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }

    pub(crate) fn spawn(&self) -> Result<Child> {
        self.command()
            .spawn()
            .map_err(|e| CoreError::spawn(&self.program, e))
    }
}

#[async_trait]
impl ProcessLauncher for CommandLauncher {
    async fn launch(&self) -> Result<Box<dyn ProcessHandle>> {
        let child = self.spawn()?;
        Ok(Box::new(ChildHandle(child)))
    }
}

pub struct ChildHandle(Child);

#[async_trait]
impl ProcessHandle for ChildHandle {
    fn id(&self) -> Option<u32> {
        self.0.id()
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        self.0.wait().await.map(|status| status.code())
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.0.kill().await
    }
}

enum Request {
    Start(oneshot::Sender<Result<()>>),
    Restart,
    Stop(oneshot::Sender<()>),
}

/// Cloneable handle to the supervisor actor.
///
/// When the last handle is dropped the actor kills the owned process and ends.
#[derive(Clone)]
pub struct SupervisorHandle {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<SupervisorState>,
}

impl SupervisorHandle {
    /// Spawn the actor. Must be called within a tokio runtime.
    pub fn spawn(launcher: Arc<dyn ProcessLauncher>, reporter: Arc<dyn Reporter>) -> Self {
        let (requests, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SupervisorState::Stopped);

        let actor = Supervisor {
            launcher,
            reporter,
            state: state_tx,
            child: None,
            launched_once: false,
        };
        tokio::spawn(actor.run(rx));

        Self { requests, state }
    }

    /// Launch the process if none is running and wait for the outcome.
    pub async fn start(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Start(reply)).is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }

    /// Request a restart without waiting for it.
    pub fn restart(&self) {
        let _ = self.requests.send(Request::Restart);
    }

    /// Terminate the owned process, if any, and wait until it is gone.
    pub async fn stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Stop(reply)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }
}

enum Event {
    Request(Option<Request>),
    Exited(std::io::Result<Option<i32>>),
}

struct Supervisor {
    launcher: Arc<dyn ProcessLauncher>,
    reporter: Arc<dyn Reporter>,
    state: watch::Sender<SupervisorState>,
    child: Option<Box<dyn ProcessHandle>>,
    launched_once: bool,
}

impl Supervisor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Request>) {
        loop {
            let event = match self.child.as_mut() {
                Some(child) => tokio::select! {
                    command = commands.recv() => Event::Request(command),
                    status = child.wait() => Event::Exited(status),
                },
                None => Event::Request(commands.recv().await),
            };

            match event {
                Event::Request(None) => {
                    self.shutdown().await;
                    break;
                }
                Event::Request(Some(Request::Start(reply))) => {
                    let result = self.start().await;
                    let _ = reply.send(result);
                }
                Event::Request(Some(Request::Restart)) => {
                    let mut coalesced = 0;
                    let mut stop = None;
                    let mut starts = Vec::new();
                    while let Ok(queued) = commands.try_recv() {
                        match queued {
                            Request::Restart => coalesced += 1,
                            Request::Start(reply) => starts.push(reply),
                            Request::Stop(reply) => {
                                stop = Some(reply);
                                break;
                            }
                        }
                    }
                    if coalesced > 0 {
                        tracing::debug!(coalesced, "coalesced queued restart requests");
                    }

                    if let Some(reply) = stop {
                        self.shutdown().await;
                        for start in starts {
                            let _ = start.send(Ok(()));
                        }
                        let _ = reply.send(());
                        continue;
                    }

                    self.restart().await;
                    for start in starts {
                        let _ = start.send(Ok(()));
                    }
                }
                Event::Request(Some(Request::Stop(reply))) => {
                    self.shutdown().await;
                    let _ = reply.send(());
                }
                Event::Exited(status) => {
                    self.child = None;
                    let code = match status {
                        Ok(code) => code,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to wait for server process");
                            None
                        }
                    };
                    self.reporter.server_status(&ServerStatus::Exited { code });
                    self.set_state(SupervisorState::CrashedRestartPending);
                }
            }
        }
    }

    fn set_state(&self, state: SupervisorState) {
        tracing::debug!(state = %state, "supervisor state");
        self.state.send_replace(state);
    }

    fn current(&self) -> SupervisorState {
        *self.state.borrow()
    }

    async fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }
        self.launch().await
    }

    async fn restart(&mut self) {
        if self.current() == SupervisorState::Stopped {
            tracing::debug!("restart requested while stopped, ignoring");
            return;
        }
        // Launch failures are reported and leave the supervisor waiting for
        // the next restart request.
        let _ = self.launch().await;
    }

    async fn launch(&mut self) -> Result<()> {
        self.terminate_child().await;

        let (state, status) = if self.launched_once {
            (SupervisorState::Restarting, ServerStatus::Restarting)
        } else {
            (SupervisorState::Starting, ServerStatus::Starting)
        };
        self.set_state(state);
        self.reporter.server_status(&status);
        self.launched_once = true;

        match self.launcher.launch().await {
            Ok(child) => {
                let pid = child.id();
                tracing::debug!(?pid, "server process launched");
                self.child = Some(child);
                self.set_state(SupervisorState::Running);
                self.reporter.server_status(&ServerStatus::Running { pid });
                Ok(())
            }
            Err(e) => {
                self.set_state(SupervisorState::CrashedRestartPending);
                self.reporter.server_status(&ServerStatus::LaunchFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn terminate_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            let pid = child.id();
            if let Err(e) = child.kill().await {
                tracing::warn!(?pid, error = %e, "failed to kill server process");
            }
        }
    }

    async fn shutdown(&mut self) {
        let had_child = self.child.is_some();
        self.terminate_child().await;
        if had_child || self.current() != SupervisorState::Stopped {
            self.reporter.server_status(&ServerStatus::Stopped);
        }
        self.set_state(SupervisorState::Stopped);
    }
}

/// Which rebuild results restart the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    /// Every rebuild notification, failed compiles included.
    #[default]
    Always,
    OnSuccess,
}

impl RestartPolicy {
    pub fn from_flag(restart_on_failed_build: bool) -> Self {
        if restart_on_failed_build {
            RestartPolicy::Always
        } else {
            RestartPolicy::OnSuccess
        }
    }
}

/// Restarts the supervised process after backend rebuilds.
pub struct RestartOnRebuild {
    supervisor: SupervisorHandle,
    policy: RestartPolicy,
}

impl RestartOnRebuild {
    pub fn new(supervisor: SupervisorHandle, policy: RestartPolicy) -> Self {
        Self { supervisor, policy }
    }
}

impl RebuildHook for RestartOnRebuild {
    fn rebuilt(&self, result: &BuildResult) {
        if self.policy == RestartPolicy::OnSuccess && !result.is_success() {
            tracing::debug!(sequence = result.sequence, "backend rebuild failed, keeping current process");
            return;
        }
        self.supervisor.restart();
    }
}
