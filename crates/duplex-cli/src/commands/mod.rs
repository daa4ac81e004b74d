//! Task execution.
//!
//! Loads the project file and run settings once, builds the lifecycle and
//! runs the requested task. Frontend watch tasks also get the development
//! server.

use duplex_config::{PipelineKind, ProjectConfig, RunConfig};
use duplex_core::{
    install_interrupt_handler, CommandCompiler, Lifecycle, Shutdown, Task, TaskOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::Cli;
use crate::dev::{DevConfig, DevServer, DevServerState, ReloadNotifier};
use crate::error::{Result, ResultExt};
use crate::reporter::TerminalReporter;
use crate::ui;

/// Run the task selected on the command line and return the process exit code.
pub async fn execute(args: Cli) -> Result<i32> {
    let task = args.task();
    let root = project_root(args.cwd.as_deref())?;

    let (project, project_file) = ProjectConfig::discover(&root)?;
    let mut run = RunConfig::load(project_file.as_deref(), task.is_watch())?;
    if args.production {
        run = run.with_production(true);
    }
    tracing::debug!(root = %root.display(), task = %task, mode = %run.mode(), "starting");

    let run = Arc::new(run);
    let project = Arc::new(project);
    let compiler = CommandCompiler::new(&root, &project.state_dir, &project.compiler);
    let mut lifecycle = Lifecycle::new(
        root,
        Arc::clone(&run),
        Arc::clone(&project),
        Arc::new(compiler),
        Arc::new(TerminalReporter::new()),
    )?;

    let (trigger, shutdown) = Shutdown::new();
    install_interrupt_handler(trigger);

    let dev_server = if serves_frontend(task) {
        let out_dir = lifecycle.pipelines().get(PipelineKind::Frontend).output_dir();
        let config = DevConfig::from_run(&run, out_dir);
        let state = Arc::new(DevServerState::new(out_dir, config.upstream));
        lifecycle = lifecycle.with_frontend_hook(Arc::new(ReloadNotifier::new(state.clone())));

        let server = DevServer::new(config, state);
        Some(tokio::spawn(async move {
            if let Err(e) = server.start().await {
                ui::error(&e.to_string());
            }
        }))
    } else {
        None
    };

    let outcome = lifecycle.execute(task, shutdown).await;
    if let Some(server) = dev_server {
        server.abort();
    }

    let outcome = outcome?;
    summarize(&outcome);
    Ok(outcome.exit_code)
}

fn serves_frontend(task: Task) -> bool {
    matches!(task, Task::Watch | Task::FrontendWatch)
}

fn project_root(cwd: Option<&Path>) -> Result<PathBuf> {
    match cwd {
        Some(dir) => std::fs::canonicalize(dir).with_path(dir),
        None => std::env::current_dir().context("Cannot determine the working directory"),
    }
}

fn summarize(outcome: &TaskOutcome) {
    let failed = outcome.failed_pipelines();
    if !failed.is_empty() && !outcome.task.is_watch() {
        let names: Vec<_> = failed.iter().map(|p| p.as_str()).collect();
        ui::error(&format!("{} failed: {}", outcome.task, names.join(", ")));
    } else if outcome.task.is_watch() {
        ui::info("Stopped watching");
    }
    tracing::debug!(task = %outcome.task, exit_code = outcome.exit_code, "task finished");
}
