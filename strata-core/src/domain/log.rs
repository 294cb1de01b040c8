//! Log line types

use serde::{Deserialize, Serialize};

use crate::domain::run::StepRunId;

/// One captured output line belonging to a step run
///
/// Append-only; `log_idx` is contiguous from 0 within a step run and defines
/// replay order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub step_run_id: StepRunId,
    pub log_idx: i64,
    pub text: String,
}
