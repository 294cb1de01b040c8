//! Run lifecycle events
//!
//! Emitted by the engine for every run and step transition; consumed by the
//! outbound webhook reporter and by status views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::run::{RunKind, RunStatus, StepRunId, StepStatus};

/// A notification about run progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        pipeline: String,
        run_id: String,
        kind: RunKind,
        at: DateTime<Utc>,
    },
    StepTransition {
        pipeline: String,
        run_id: String,
        step: String,
        /// Present once the step has a ledger record (skipped steps have none).
        step_run_id: Option<StepRunId>,
        status: StepStatus,
        at: DateTime<Utc>,
    },
    RunFinished {
        pipeline: String,
        run_id: String,
        status: RunStatus,
        at: DateTime<Utc>,
    },
}

impl RunEvent {
    /// Pipeline the event belongs to.
    pub fn pipeline(&self) -> &str {
        match self {
            RunEvent::RunStarted { pipeline, .. } => pipeline,
            RunEvent::StepTransition { pipeline, .. } => pipeline,
            RunEvent::RunFinished { pipeline, .. } => pipeline,
        }
    }

    pub fn run_started(pipeline: &str, run_id: &str, kind: RunKind) -> Self {
        RunEvent::RunStarted {
            pipeline: pipeline.to_string(),
            run_id: run_id.to_string(),
            kind,
            at: Utc::now(),
        }
    }

    pub fn step_transition(
        pipeline: &str,
        run_id: &str,
        step: &str,
        step_run_id: Option<StepRunId>,
        status: StepStatus,
    ) -> Self {
        RunEvent::StepTransition {
            pipeline: pipeline.to_string(),
            run_id: run_id.to_string(),
            step: step.to_string(),
            step_run_id,
            status,
            at: Utc::now(),
        }
    }

    pub fn run_finished(pipeline: &str, run_id: &str, status: RunStatus) -> Self {
        RunEvent::RunFinished {
            pipeline: pipeline.to_string(),
            run_id: run_id.to_string(),
            status,
            at: Utc::now(),
        }
    }
}
