//! Startup reconciliation
//!
//! A step run left with `finished_at` unset across a process restart cannot
//! still be executing; it is closed as interrupted, never resumed. Any
//! execution context still on disk belongs to a run that died with the
//! process and is destroyed. Run before accepting any trigger.

use tracing::info;

use strata_ledger::{PgPool, step_runs};
use strata_store::EnvironmentStore;

use crate::error::EngineError;

/// What the sweep found and fixed.
#[derive(Debug)]
pub struct RecoveryReport {
    pub interrupted_step_runs: u64,
    pub destroyed_contexts: Vec<String>,
}

pub async fn reconcile(
    pool: &PgPool,
    store: &EnvironmentStore,
) -> Result<RecoveryReport, EngineError> {
    let interrupted_step_runs = step_runs::sweep_interrupted(pool).await?;
    let destroyed_contexts = store.sweep_orphans().await?;

    if interrupted_step_runs > 0 || !destroyed_contexts.is_empty() {
        info!(
            "recovery: {} interrupted step run(s), {} orphaned context(s) destroyed",
            interrupted_step_runs,
            destroyed_contexts.len()
        );
    }

    Ok(RecoveryReport {
        interrupted_step_runs,
        destroyed_contexts,
    })
}
