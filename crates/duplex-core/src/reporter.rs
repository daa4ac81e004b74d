//! Human-facing reporting seam.
//!
//! The engine reports through a [`Reporter`]; the CLI renders to the terminal
//! and [`TracingReporter`] emits structured events for everything else.

use duplex_config::PipelineKind;
use std::fmt;
use std::path::Path;

use crate::compiler::{BuildOutcome, BuildResult};
use crate::error::CoreError;

/// Supervised process status changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    /// First launch of the run.
    Starting,
    /// Any later launch.
    Restarting,
    Running { pid: Option<u32> },
    /// The process ended on its own.
    Exited { code: Option<i32> },
    LaunchFailed { message: String },
    Stopped,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Starting => f.write_str("Starting server"),
            ServerStatus::Restarting => f.write_str("Restarting server"),
            ServerStatus::Running { pid: Some(pid) } => write!(f, "Server running (pid {})", pid),
            ServerStatus::Running { pid: None } => f.write_str("Server running"),
            ServerStatus::Exited { code } => {
                write!(f, "Server process exited with code {}", display_code(*code))
            }
            ServerStatus::LaunchFailed { message } => {
                write!(f, "Server failed to start: {}", message)
            }
            ServerStatus::Stopped => f.write_str("Server stopped"),
        }
    }
}

/// `null` mirrors how a signal-terminated process reports its code.
pub fn display_code(code: Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "null".to_string())
}

pub trait Reporter: Send + Sync {
    fn cleaned(&self, _pipeline: PipelineKind, _dir: &Path, _removed: usize) {}

    fn build_started(&self, _pipeline: PipelineKind, _sequence: u64) {}

    /// Called for every compiler result, success or failure.
    fn build_finished(&self, result: &BuildResult);

    fn server_status(&self, status: &ServerStatus);

    fn watch_degraded(&self, _pipeline: PipelineKind, _error: &CoreError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn cleaned(&self, pipeline: PipelineKind, dir: &Path, removed: usize) {
        tracing::info!(pipeline = %pipeline, dir = %dir.display(), removed, "cleaned output");
    }

    fn build_started(&self, pipeline: PipelineKind, sequence: u64) {
        tracing::debug!(pipeline = %pipeline, sequence, "compiling");
    }

    fn build_finished(&self, result: &BuildResult) {
        match &result.outcome {
            BuildOutcome::Success(stats) => tracing::info!(
                pipeline = %result.pipeline,
                sequence = result.sequence,
                duration_ms = stats.duration.as_millis() as u64,
                "{}",
                stats.report
            ),
            BuildOutcome::Failure(err) => tracing::error!(
                pipeline = %result.pipeline,
                sequence = result.sequence,
                exit_code = ?err.exit_code,
                "{}",
                err.message
            ),
        }
    }

    fn server_status(&self, status: &ServerStatus) {
        match status {
            ServerStatus::LaunchFailed { .. } => tracing::error!("{}", status),
            _ => tracing::info!("{}", status),
        }
    }

    fn watch_degraded(&self, pipeline: PipelineKind, error: &CoreError) {
        tracing::warn!(pipeline = %pipeline, error = %error, "file watching degraded, restart to recover");
    }
}
