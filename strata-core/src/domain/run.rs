//! Run state types
//!
//! A run is one execution of a pipeline inside a cloned context. The run as
//! a whole moves `Provisioning -> Executing -> Succeeded | Failed`; each step
//! within it moves `Pending -> Running -> Succeeded | Failed | Skipped`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one recorded step execution attempt.
pub type StepRunId = Uuid;

/// What kind of run was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Normal triggered run; the context is discarded afterwards.
    Trigger,
    /// Provisioning run against a clone; promoted to the new base on success.
    Refresh,
    /// First-time provisioning of the base environment itself.
    Provision,
}

/// Overall state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Provisioning,
    Executing,
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Provisioning => write!(f, "provisioning"),
            RunStatus::Executing => write!(f, "executing"),
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Sub-state of one step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Why a step ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Succeeded,
    /// The script exited with a non-zero status.
    Failed { exit_code: i32 },
    /// The script was terminated by a signal.
    Signaled,
    /// The run was canceled while the step was executing.
    Canceled,
    /// Left unfinished by a process crash; set by the startup sweep.
    Interrupted,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded)
    }

    /// Terminal step status this outcome corresponds to.
    pub fn step_status(&self) -> StepStatus {
        match self {
            StepOutcome::Succeeded => StepStatus::Succeeded,
            _ => StepStatus::Failed,
        }
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepOutcome::Succeeded => write!(f, "succeeded"),
            StepOutcome::Failed { exit_code } => write!(f, "failed with exit code {}", exit_code),
            StepOutcome::Signaled => write!(f, "terminated by signal"),
            StepOutcome::Canceled => write!(f, "canceled"),
            StepOutcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// One recorded step execution attempt
///
/// Identity is assigned at creation and never changes; `started_at` and
/// `finished_at` are each written exactly once. A record with `finished_at`
/// unset is either currently executing or was orphaned by a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub id: StepRunId,
    pub pipeline_name: String,
    pub step_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<StepOutcome>,
}
