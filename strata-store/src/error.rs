//! Environment store errors

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by storage and isolation operations
///
/// Anything surfacing from here during a run is fatal to that run: no step
/// can safely execute in a context that failed to provision, clone or boot.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A run was requested before the pipeline's base was provisioned.
    #[error("no base environment provisioned for pipeline '{0}'")]
    NotProvisioned(String),

    /// `create_base` without refresh on an already-provisioned pipeline.
    #[error("base environment for pipeline '{0}' already exists")]
    BaseAlreadyExists(String),

    /// Another execution context for the pipeline is still live.
    #[error("pipeline '{0}' already has an active execution context")]
    ContextActive(String),

    /// An external command exited non-zero.
    #[error("`{command}` failed with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    /// An external command could not be spawned at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The zone booted but never became ready to execute commands.
    #[error("zone '{zone}' did not become ready within {timeout_secs}s")]
    BootTimeout { zone: String, timeout_secs: u64 },
}
