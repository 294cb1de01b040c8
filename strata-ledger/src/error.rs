//! Ledger errors

use strata_core::domain::run::StepRunId;
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("pipeline '{0}' not found")]
    PipelineNotFound(String),

    #[error("step run {0} not found")]
    StepRunNotFound(StepRunId),

    /// A stored definition no longer deserializes (schema drift).
    #[error("invalid stored definition for pipeline '{name}': {source}")]
    InvalidDefinition {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
