//! Frontend rebuilds to browser events.

use duplex_core::{BuildOutcome, BuildResult, RebuildHook};

use super::{DevEvent, SharedState};

/// Forwards every frontend rebuild to the connected browsers.
pub struct ReloadNotifier {
    state: SharedState,
}

impl ReloadNotifier {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl From<&BuildResult> for DevEvent {
    fn from(result: &BuildResult) -> Self {
        match &result.outcome {
            BuildOutcome::Success(stats) => DevEvent::Built {
                sequence: result.sequence,
                duration_ms: stats.duration.as_millis() as u64,
            },
            BuildOutcome::Failure(error) => DevEvent::Failed {
                sequence: result.sequence,
                error: error.message.clone(),
            },
        }
    }
}

impl RebuildHook for ReloadNotifier {
    fn rebuilt(&self, result: &BuildResult) {
        tracing::debug!(
            sequence = result.sequence,
            clients = self.state.client_count(),
            "notifying browsers"
        );
        self.state.publish(DevEvent::from(result));
    }
}
