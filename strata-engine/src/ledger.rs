//! Run ledger abstraction
//!
//! The scheduler records every step transition and output line through this
//! trait. The Postgres implementation delegates to the repositories in
//! `strata-ledger`; [`MemoryLedger`] keeps everything in memory for tests
//! and dry runs.
//!
//! Appends are awaited before the next line is pumped, and `finish_step_run`
//! only runs after the last append returned, so `finished_at` being set
//! implies every line of that step is durably recorded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use strata_core::domain::run::{StepOutcome, StepRunId};
use strata_ledger::{LedgerError, PgPool, logs, step_runs};
use uuid::Uuid;

/// Persistence seam for step-run records and their log streams
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Allocates a new step run with `started_at` set to now.
    async fn begin_step_run(&self, pipeline: &str, step: &str) -> Result<StepRunId, LedgerError>;

    /// Persists one output line under the next contiguous index.
    async fn append_log(&self, id: StepRunId, text: &str) -> Result<(), LedgerError>;

    /// Sets `finished_at` and the outcome, exactly once.
    async fn finish_step_run(&self, id: StepRunId, outcome: &StepOutcome)
    -> Result<(), LedgerError>;

    /// Last `limit` lines of the step run, in order; used for failure
    /// reports.
    async fn log_tail(&self, id: StepRunId, limit: i64) -> Result<Vec<String>, LedgerError>;
}

/// Postgres-backed ledger
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunLedger for PgLedger {
    async fn begin_step_run(&self, pipeline: &str, step: &str) -> Result<StepRunId, LedgerError> {
        let record = step_runs::begin(&self.pool, pipeline, step).await?;
        Ok(record.id)
    }

    async fn append_log(&self, id: StepRunId, text: &str) -> Result<(), LedgerError> {
        logs::append(&self.pool, id, text).await?;
        Ok(())
    }

    async fn finish_step_run(
        &self,
        id: StepRunId,
        outcome: &StepOutcome,
    ) -> Result<(), LedgerError> {
        step_runs::finish(&self.pool, id, outcome).await
    }

    async fn log_tail(&self, id: StepRunId, limit: i64) -> Result<Vec<String>, LedgerError> {
        let lines = logs::tail(&self.pool, id, limit).await?;
        Ok(lines.into_iter().map(|l| l.text).collect())
    }
}

/// One recorded step run held by [`MemoryLedger`].
#[derive(Debug, Clone)]
pub struct MemoryStepRun {
    pub id: StepRunId,
    pub pipeline: String,
    pub step: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<StepOutcome>,
    pub logs: Vec<String>,
}

/// In-memory implementation of [`RunLedger`]
///
/// Thread-safe via `Arc<Mutex<..>>`; clones share the same records.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    records: Arc<Mutex<Vec<MemoryStepRun>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, in creation order.
    pub fn snapshot(&self) -> Vec<MemoryStepRun> {
        self.records.lock().unwrap().clone()
    }

    /// The record for a step name, if one was created.
    pub fn step_run(&self, step: &str) -> Option<MemoryStepRun> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.step == step)
            .cloned()
    }
}

#[async_trait]
impl RunLedger for MemoryLedger {
    async fn begin_step_run(&self, pipeline: &str, step: &str) -> Result<StepRunId, LedgerError> {
        let id = Uuid::new_v4();
        self.records.lock().unwrap().push(MemoryStepRun {
            id,
            pipeline: pipeline.to_string(),
            step: step.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
            logs: Vec::new(),
        });
        Ok(id)
    }

    async fn append_log(&self, id: StepRunId, text: &str) -> Result<(), LedgerError> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.logs.push(text.to_string());
                Ok(())
            }
            None => Err(LedgerError::StepRunNotFound(id)),
        }
    }

    async fn finish_step_run(
        &self,
        id: StepRunId,
        outcome: &StepOutcome,
    ) -> Result<(), LedgerError> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == id && r.finished_at.is_none()) {
            Some(record) => {
                record.finished_at = Some(Utc::now());
                record.outcome = Some(*outcome);
                Ok(())
            }
            None => Err(LedgerError::StepRunNotFound(id)),
        }
    }

    async fn log_tail(&self, id: StepRunId, limit: i64) -> Result<Vec<String>, LedgerError> {
        let records = self.records.lock().unwrap();
        match records.iter().find(|r| r.id == id) {
            Some(record) => {
                let skip = record.logs.len().saturating_sub(limit as usize);
                Ok(record.logs[skip..].to_vec())
            }
            None => Err(LedgerError::StepRunNotFound(id)),
        }
    }
}
