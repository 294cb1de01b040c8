use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Committed pipeline definitions
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            name VARCHAR(32) PRIMARY KEY,
            definition JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per step execution attempt. `outcome` is NULL while the step
    // is executing; a NULL outcome across a restart means the process
    // crashed mid-step and the startup sweep marks it interrupted.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            id UUID PRIMARY KEY,
            pipeline_name VARCHAR(32) NOT NULL,
            step_name VARCHAR(255) NOT NULL,
            started_at TIMESTAMPTZ,
            finished_at TIMESTAMPTZ,
            outcome VARCHAR(50)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Ordered, append-only log lines. log_idx starts at 0 per step run and
    // is contiguous; the unique index enforces it never collides.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_run_logs (
            id BIGSERIAL PRIMARY KEY,
            pipeline_run_id UUID NOT NULL REFERENCES pipeline_runs(id) ON DELETE CASCADE,
            log_idx BIGINT NOT NULL,
            textlog TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_run_logs_run_idx \
         ON pipeline_run_logs(pipeline_run_id, log_idx)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_runs_name \
         ON pipeline_runs(pipeline_name, started_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_runs_unfinished \
         ON pipeline_runs(finished_at) WHERE finished_at IS NULL",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
