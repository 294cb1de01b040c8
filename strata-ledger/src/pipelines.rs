//! Pipeline Repository
//!
//! Stores committed pipeline definitions as JSONB. A commit overwrites the
//! previous definition; run history in `pipeline_runs` is untouched.

use chrono::Utc;
use sqlx::PgPool;
use strata_core::domain::pipeline::Pipeline;

use crate::error::{LedgerError, Result};

/// Insert or replace a committed definition
pub async fn save(pool: &PgPool, pipeline: &Pipeline) -> Result<()> {
    let now = Utc::now();
    let definition =
        serde_json::to_value(pipeline).map_err(|source| LedgerError::InvalidDefinition {
            name: pipeline.name.clone(),
            source,
        })?;

    sqlx::query(
        r#"
        INSERT INTO pipelines (name, definition, created_at, updated_at)
        VALUES ($1, $2, $3, $3)
        ON CONFLICT (name)
        DO UPDATE SET definition = EXCLUDED.definition, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&pipeline.name)
    .bind(definition)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::info!("Pipeline definition committed: {}", pipeline.name);
    Ok(())
}

/// Load a definition by name
pub async fn load(pool: &PgPool, name: &str) -> Result<Option<Pipeline>> {
    let row: Option<(serde_json::Value,)> =
        sqlx::query_as("SELECT definition FROM pipelines WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;

    match row {
        Some((definition,)) => {
            let pipeline = serde_json::from_value(definition).map_err(|source| {
                LedgerError::InvalidDefinition {
                    name: name.to_string(),
                    source,
                }
            })?;
            Ok(Some(pipeline))
        }
        None => Ok(None),
    }
}

/// Names of all committed pipelines
pub async fn list_names(pool: &PgPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM pipelines ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Delete a definition by name
pub async fn delete(pool: &PgPool, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM pipelines WHERE name = $1")
        .bind(name)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
