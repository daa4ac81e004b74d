//! Orchestration engine for duplex.
//!
//! Two pipelines (a browser bundle and a server bundle) are compiled by an
//! external [`Compiler`]. This crate decides when that happens and what
//! follows:
//!
//! - [`BuildRunner`] - purge, compile once, report
//! - [`WatchRunner`] - recompile on every debounced change batch
//! - [`SupervisorHandle`] - the one backend process of a watch run
//! - [`ProductionWrapper`] - the always-restart wrapper of a production run
//! - [`Lifecycle`] - the task graph and interrupt handling tying it together
//!
//! # Example
//!
//! ```rust,no_run
//! use duplex_config::{ProjectConfig, RunConfig};
//! use duplex_core::{CommandCompiler, Lifecycle, Shutdown, Task, TracingReporter};
//! use std::sync::Arc;
//!
//! # async fn demo() -> duplex_core::Result<()> {
//! let root = std::env::current_dir().unwrap();
//! let project = ProjectConfig::default();
//! let compiler = CommandCompiler::new(&root, &project.state_dir, &project.compiler);
//! let lifecycle = Lifecycle::new(
//!     &root,
//!     Arc::new(RunConfig::development()),
//!     Arc::new(project),
//!     Arc::new(compiler),
//!     Arc::new(TracingReporter),
//! )?;
//!
//! let (_trigger, shutdown) = Shutdown::new();
//! let outcome = lifecycle.execute(Task::Build, shutdown).await?;
//! std::process::exit(outcome.exit_code);
//! # }
//! ```

pub mod build;
pub mod clean;
pub mod compiler;
pub mod error;
pub mod lifecycle;
pub mod reporter;
pub mod supervisor;
pub mod watch;
pub mod watcher;
pub mod wrapper;

pub use build::BuildRunner;
pub use clean::purge_output_dir;
pub use compiler::{BuildOutcome, BuildResult, CommandCompiler, CompileError, CompileStats, Compiler};
pub use error::{CoreError, Result};
pub use lifecycle::{
    install_interrupt_handler, ChangeSource, Lifecycle, NotifyChangeSource, Shutdown,
    ShutdownTrigger, Task, TaskOutcome,
};
pub use reporter::{Reporter, ServerStatus, TracingReporter};
pub use supervisor::{
    ChildHandle, CommandLauncher, ProcessHandle, ProcessLauncher, RestartOnRebuild, RestartPolicy,
    SupervisorHandle, SupervisorState,
};
pub use watch::{RebuildHook, WatchRunner, WatchSession};
pub use watcher::{ChangeBatch, ChangeFeed, FileWatcher, IgnoreRules, WatchEvent, DEBOUNCE};
pub use wrapper::{ProductionWrapper, WrapperExit};
