//! Strata Run Ledger
//!
//! Durable record of pipeline definitions and run history:
//! - `pipelines`: committed definitions, one row per pipeline
//! - `pipeline_runs`: one row per step execution attempt (timing + outcome)
//! - `pipeline_run_logs`: ordered, append-only output lines per step run
//!
//! Each repository module holds the database operations for one entity.
//! A write failure here is fatal to the run that caused it: a run whose own
//! record of itself cannot be trusted is not allowed to report success.

pub mod db;
pub mod error;
pub mod logs;
pub mod pipelines;
pub mod step_runs;

pub use error::{LedgerError, Result};
pub use sqlx::PgPool;
