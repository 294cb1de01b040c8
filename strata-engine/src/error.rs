//! Engine errors

use strata_core::ValidationError;
use strata_ledger::LedgerError;
use strata_store::StoreError;
use thiserror::Error;

/// Errors surfaced by run orchestration
///
/// `Store` and `Ledger` failures are fatal to the run that hit them: no step
/// can safely execute in a context that failed to provision, and a run whose
/// own record cannot be written is not allowed to report success.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The single-context-per-pipeline invariant would be violated.
    #[error("pipeline '{0}' already has a run in progress")]
    PipelineBusy(String),

    #[error("pipeline '{0}' not found")]
    PipelineNotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A scheduler worker aborted abnormally.
    #[error("internal error: {0}")]
    Internal(String),
}
