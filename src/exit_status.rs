use serde::{Deserialize, Serialize};
use serde_json::json;

/// Terminal classification of a dispatched job.
///
/// Severity is total-ordered: `Failed > Skipped > Completed`. A job-level
/// status is the maximum severity observed across its steps, so a fault is
/// never downgraded by a later clean or partially-failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitStatus {
    Completed,
    Skipped,
    Failed,
}

impl ExitStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExitStatus::Completed => "completed",
            ExitStatus::Skipped => "skipped",
            ExitStatus::Failed => "failed",
        }
    }
}

/// Per-step record counters reported by a step runner.
///
/// `skip_count` counts records rejected by validation and deliberately not
/// written; a mismatch between `write_count` and `read_count` is the other
/// partial-failure signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_name: String,
    pub read_count: u64,
    pub write_count: u64,
    pub skip_count: u64,
}

impl StepExecution {
    #[must_use]
    pub fn clean(step_name: impl Into<String>, count: u64) -> Self {
        Self {
            step_name: step_name.into(),
            read_count: count,
            write_count: count,
            skip_count: 0,
        }
    }

    /// Classify this step's outcome.
    #[must_use]
    pub fn exit_status(&self) -> ExitStatus {
        if self.write_count != self.read_count || self.skip_count > 0 {
            ExitStatus::Skipped
        } else {
            ExitStatus::Completed
        }
    }
}

/// Fold step-level classifications into one job-level status.
///
/// A job with no steps completed cleanly by definition.
#[must_use]
pub fn aggregate(steps: &[StepExecution]) -> ExitStatus {
    steps
        .iter()
        .map(StepExecution::exit_status)
        .max()
        .unwrap_or(ExitStatus::Completed)
}

/// Aggregated result of one dispatched request, consumed exactly once to
/// write the terminal status back to the request store.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub status: ExitStatus,
    pub steps: Vec<StepExecution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    #[must_use]
    pub fn from_steps(steps: Vec<StepExecution>) -> Self {
        Self {
            status: aggregate(&steps),
            steps,
            error: None,
        }
    }

    /// Outcome for a job that raised an unhandled fault. Steps that finished
    /// before the fault are kept for diagnostics; the status is always
    /// `Failed` regardless of their classification.
    #[must_use]
    pub fn fault(steps: Vec<StepExecution>, error: impl Into<String>) -> Self {
        Self {
            status: ExitStatus::Failed,
            steps,
            error: Some(error.into()),
        }
    }

    /// Diagnostic detail persisted alongside the terminal status.
    #[must_use]
    pub fn detail(&self) -> serde_json::Value {
        json!(self)
    }
}
