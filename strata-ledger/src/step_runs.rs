//! Step Run Repository
//!
//! Handles all database operations for step execution records. Identity is
//! assigned at `begin`; `started_at` and `finished_at` are each written
//! exactly once.

use chrono::Utc;
use sqlx::PgPool;
use strata_core::domain::run::{StepOutcome, StepRun, StepRunId};
use uuid::Uuid;

use crate::error::{LedgerError, Result};

/// Create a new step run record with `started_at` set to now
pub async fn begin(pool: &PgPool, pipeline_name: &str, step_name: &str) -> Result<StepRun> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO pipeline_runs (id, pipeline_name, step_name, started_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(id)
    .bind(pipeline_name)
    .bind(step_name)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(StepRun {
        id,
        pipeline_name: pipeline_name.to_string(),
        step_name: step_name.to_string(),
        started_at: Some(now),
        finished_at: None,
        outcome: None,
    })
}

/// Set `finished_at` and the outcome, exactly once
///
/// The `finished_at IS NULL` guard makes a double finish visible as
/// `StepRunNotFound` instead of silently rewriting history.
pub async fn finish(pool: &PgPool, id: StepRunId, outcome: &StepOutcome) -> Result<()> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE pipeline_runs
        SET finished_at = $1, outcome = $2
        WHERE id = $3 AND finished_at IS NULL
        "#,
    )
    .bind(now)
    .bind(outcome_to_string(outcome))
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::StepRunNotFound(id));
    }
    Ok(())
}

/// Find a step run by ID
pub async fn find_by_id(pool: &PgPool, id: StepRunId) -> Result<Option<StepRun>> {
    let row = sqlx::query_as::<_, StepRunRow>(
        r#"
        SELECT id, pipeline_name, step_name, started_at, finished_at, outcome
        FROM pipeline_runs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// All step runs of a pipeline, newest first
pub async fn find_by_pipeline(pool: &PgPool, pipeline_name: &str) -> Result<Vec<StepRun>> {
    let rows = sqlx::query_as::<_, StepRunRow>(
        r#"
        SELECT id, pipeline_name, step_name, started_at, finished_at, outcome
        FROM pipeline_runs
        WHERE pipeline_name = $1
        ORDER BY started_at DESC
        "#,
    )
    .bind(pipeline_name)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Close every record left unfinished by a crashed process
///
/// A record with NULL `finished_at` at startup cannot still be executing;
/// it is reported as interrupted rather than resumed.
pub async fn sweep_interrupted(pool: &PgPool) -> Result<u64> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE pipeline_runs
        SET finished_at = $1, outcome = $2
        WHERE finished_at IS NULL
        "#,
    )
    .bind(now)
    .bind(outcome_to_string(&StepOutcome::Interrupted))
    .execute(pool)
    .await?;

    let swept = result.rows_affected();
    if swept > 0 {
        tracing::warn!("marked {} interrupted step run(s)", swept);
    }
    Ok(swept)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn outcome_to_string(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Succeeded => "succeeded".to_string(),
        StepOutcome::Failed { exit_code } => format!("failed:{}", exit_code),
        StepOutcome::Signaled => "signaled".to_string(),
        StepOutcome::Canceled => "canceled".to_string(),
        StepOutcome::Interrupted => "interrupted".to_string(),
    }
}

fn string_to_outcome(s: &str) -> Option<StepOutcome> {
    match s {
        "succeeded" => Some(StepOutcome::Succeeded),
        "signaled" => Some(StepOutcome::Signaled),
        "canceled" => Some(StepOutcome::Canceled),
        "interrupted" => Some(StepOutcome::Interrupted),
        other => {
            let exit_code = other.strip_prefix("failed:")?.parse().ok()?;
            Some(StepOutcome::Failed { exit_code })
        }
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct StepRunRow {
    id: Uuid,
    pipeline_name: String,
    step_name: String,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
    outcome: Option<String>,
}

impl From<StepRunRow> for StepRun {
    fn from(row: StepRunRow) -> Self {
        StepRun {
            id: row.id,
            pipeline_name: row.pipeline_name,
            step_name: row.step_name,
            started_at: row.started_at,
            finished_at: row.finished_at,
            outcome: row.outcome.as_deref().and_then(string_to_outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_strings_round_trip() {
        for outcome in [
            StepOutcome::Succeeded,
            StepOutcome::Failed { exit_code: 2 },
            StepOutcome::Signaled,
            StepOutcome::Canceled,
            StepOutcome::Interrupted,
        ] {
            let s = outcome_to_string(&outcome);
            assert_eq!(string_to_outcome(&s), Some(outcome));
        }
    }

    #[test]
    fn test_unknown_outcome_string_maps_to_none() {
        assert_eq!(string_to_outcome("exploded"), None);
        assert_eq!(string_to_outcome("failed:notanumber"), None);
    }
}
