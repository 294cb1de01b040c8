//! Step Run API Handlers
//!
//! Status views over the run ledger. Log reads are restartable via the
//! `from` query parameter, which is what live tailing uses: re-issue the
//! same request from the last index you saw.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use strata_core::domain::log::LogLine;
use strata_core::domain::run::StepRun;
use strata_ledger::{logs, step_runs};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// GET /pipeline/{name}/runs
/// Step run records of a pipeline, newest first
pub async fn list_step_runs(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<StepRun>>> {
    tracing::debug!("Listing step runs for pipeline: {}", name);

    let runs = step_runs::find_by_pipeline(&state.pool, &name).await?;
    Ok(Json(runs))
}

/// GET /run/{id}
/// One step run record
pub async fn get_step_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StepRun>> {
    let run = step_runs::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Step run {} not found", id)))?;

    Ok(Json(run))
}

#[derive(Deserialize)]
pub struct LogsQuery {
    /// First index to return; defaults to the beginning.
    #[serde(default)]
    pub from: i64,
}

/// GET /run/{id}/logs?from=N
/// Ordered log lines of a step run, starting at index N
pub async fn get_step_run_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Vec<LogLine>>> {
    // Distinguish "no lines yet" from "no such run".
    step_runs::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Step run {} not found", id)))?;

    let lines = logs::read_from(&state.pool, id, query.from).await?;
    Ok(Json(lines))
}
