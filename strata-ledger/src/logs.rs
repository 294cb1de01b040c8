//! Log Repository
//!
//! Append-only log lines per step run. The next index is assigned inside
//! the INSERT itself, scoped to the step run; ordering is safe because each
//! step run has exactly one writer (the step's own output pump), while
//! different step runs append concurrently without interfering. The unique
//! `(pipeline_run_id, log_idx)` index backstops the contiguity invariant.

use sqlx::PgPool;
use strata_core::domain::log::LogLine;
use strata_core::domain::run::StepRunId;

use crate::error::Result;

/// Persist one line and return its assigned index
pub async fn append(pool: &PgPool, step_run_id: StepRunId, text: &str) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO pipeline_run_logs (pipeline_run_id, log_idx, textlog)
        SELECT $1,
               COALESCE((SELECT MAX(log_idx) + 1 FROM pipeline_run_logs
                         WHERE pipeline_run_id = $1), 0),
               $2
        RETURNING log_idx
        "#,
    )
    .bind(step_run_id)
    .bind(text)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Lines of a step run from `from_idx` on, in index order
///
/// Restartable: a live tail is this query re-issued from the last seen
/// index.
pub async fn read_from(pool: &PgPool, step_run_id: StepRunId, from_idx: i64) -> Result<Vec<LogLine>> {
    let rows = sqlx::query_as::<_, LogLineRow>(
        r#"
        SELECT pipeline_run_id, log_idx, textlog
        FROM pipeline_run_logs
        WHERE pipeline_run_id = $1 AND log_idx >= $2
        ORDER BY log_idx ASC
        "#,
    )
    .bind(step_run_id)
    .bind(from_idx)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Last `limit` lines of a step run, in index order
pub async fn tail(pool: &PgPool, step_run_id: StepRunId, limit: i64) -> Result<Vec<LogLine>> {
    let rows = sqlx::query_as::<_, LogLineRow>(
        r#"
        SELECT pipeline_run_id, log_idx, textlog
        FROM (
            SELECT pipeline_run_id, log_idx, textlog
            FROM pipeline_run_logs
            WHERE pipeline_run_id = $1
            ORDER BY log_idx DESC
            LIMIT $2
        ) AS recent
        ORDER BY log_idx ASC
        "#,
    )
    .bind(step_run_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Line count for a step run
pub async fn count(pool: &PgPool, step_run_id: StepRunId) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM pipeline_run_logs WHERE pipeline_run_id = $1")
            .bind(step_run_id)
            .fetch_one(pool)
            .await?;

    Ok(row.0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct LogLineRow {
    pipeline_run_id: uuid::Uuid,
    log_idx: i64,
    textlog: String,
}

impl From<LogLineRow> for LogLine {
    fn from(row: LogLineRow) -> Self {
        LogLine {
            step_run_id: row.pipeline_run_id,
            log_idx: row.log_idx,
            text: row.textlog,
        }
    }
}
