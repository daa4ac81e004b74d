//! Terminal rendering of engine events.

use duplex_config::PipelineKind;
use duplex_core::{BuildOutcome, BuildResult, CoreError, Reporter, ServerStatus};
use std::path::Path;

use crate::ui;

/// Prints compiler reports and server status lines.
///
/// Successful reports go to stdout so they can be piped; failures and status
/// lines go to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalReporter;

impl TerminalReporter {
    pub fn new() -> Self {
        Self
    }
}

/// One-line summary of a result.
pub fn headline(result: &BuildResult) -> String {
    let action = if result.is_initial() { "compiled" } else { "recompiled" };
    match &result.outcome {
        BuildOutcome::Success(stats) => format!(
            "{} {} in {}",
            result.pipeline,
            action,
            ui::format_duration(stats.duration)
        ),
        BuildOutcome::Failure(_) => format!("{} compilation failed", result.pipeline),
    }
}

impl Reporter for TerminalReporter {
    fn cleaned(&self, pipeline: PipelineKind, dir: &Path, removed: usize) {
        tracing::debug!(pipeline = %pipeline, removed, "cleaned output");
        if removed > 0 {
            ui::debug(&format!("cleaned {} ({} entries)", dir.display(), removed));
        }
    }

    fn build_started(&self, pipeline: PipelineKind, sequence: u64) {
        if sequence > 0 {
            ui::info(&format!("{} changed, recompiling", pipeline));
        }
    }

    fn build_finished(&self, result: &BuildResult) {
        match &result.outcome {
            BuildOutcome::Success(stats) => {
                ui::success(&headline(result));
                if !stats.report.is_empty() {
                    println!("{}", ui::indent(&stats.report, 2));
                }
            }
            BuildOutcome::Failure(error) => {
                ui::error(&headline(result));
                eprintln!("{}", ui::indent(&error.message, 2));
            }
        }
    }

    fn server_status(&self, status: &ServerStatus) {
        let line = status.to_string();
        match status {
            ServerStatus::Running { .. } => ui::success(&line),
            ServerStatus::Exited { .. } | ServerStatus::LaunchFailed { .. } => ui::error(&line),
            ServerStatus::Starting | ServerStatus::Restarting | ServerStatus::Stopped => {
                ui::info(&line)
            }
        }
    }

    fn watch_degraded(&self, pipeline: PipelineKind, error: &CoreError) {
        ui::warning(&format!(
            "{} is no longer watched for changes: {}",
            pipeline, error
        ));
    }
}
