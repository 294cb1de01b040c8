//! Pipeline API Handlers
//!
//! Commit, trigger, refresh and cancel. Runs are long; every endpoint that
//! starts one answers 202 immediately and the run proceeds in a spawned
//! task. The busy check here is a courtesy: the engine's claim registry is
//! what actually enforces one run per pipeline, so a race between two
//! triggers resolves to one run and one logged refusal.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;

use strata_core::domain::pipeline::Pipeline;
use strata_core::graph;
use strata_ledger::pipelines;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

#[derive(Serialize)]
pub struct RunAccepted {
    pub pipeline: String,
    pub status: &'static str,
}

fn busy_error(name: &str) -> ApiError {
    ApiError::Conflict(format!("Pipeline {} already has a run in progress", name))
}

/// POST /pipeline/commit
/// Validate and store a definition, then provision its base environment
pub async fn commit_pipeline(
    State(state): State<AppState>,
    Json(pipeline): Json<Pipeline>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    tracing::info!("Committing pipeline: {}", pipeline.name);

    graph::validate(&pipeline).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if state.runner.is_busy(&pipeline.name) {
        return Err(busy_error(&pipeline.name));
    }

    let name = pipeline.name.clone();
    let runner = Arc::clone(&state.runner);
    tokio::spawn(async move {
        if let Err(e) = runner.commit(pipeline).await {
            tracing::error!("Commit run failed: {}", e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            pipeline: name,
            status: "provisioning",
        }),
    ))
}

/// GET /pipeline/list
/// Names of all committed pipelines
pub async fn list_pipelines(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let names = pipelines::list_names(&state.pool).await?;
    Ok(Json(names))
}

/// POST /pipeline/{name}/trigger
/// Webhook target: perform a normal, non-promoting run
pub async fn trigger_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    tracing::info!("Trigger received for pipeline: {}", name);

    state.runner.load_pipeline(&name).await?;
    if state.runner.is_busy(&name) {
        return Err(busy_error(&name));
    }

    let runner = Arc::clone(&state.runner);
    let pipeline = name.clone();
    tokio::spawn(async move {
        if let Err(e) = runner.trigger(&pipeline).await {
            tracing::error!("Run of pipeline {} failed: {}", pipeline, e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            pipeline: name,
            status: "accepted",
        }),
    ))
}

/// POST /pipeline/{name}/refresh
/// Re-provision against the current definition; promotes on success
pub async fn refresh_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    tracing::info!("Refresh requested for pipeline: {}", name);

    state.runner.load_pipeline(&name).await?;
    if state.runner.is_busy(&name) {
        return Err(busy_error(&name));
    }

    let runner = Arc::clone(&state.runner);
    let pipeline = name.clone();
    tokio::spawn(async move {
        if let Err(e) = runner.refresh(&pipeline).await {
            tracing::error!("Refresh of pipeline {} failed: {}", pipeline, e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            pipeline: name,
            status: "accepted",
        }),
    ))
}

/// POST /pipeline/{name}/cancel
/// Cancel the pipeline's in-flight run
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if state.runner.cancel(&name) {
        tracing::info!("Canceled run of pipeline: {}", name);
        Ok(Json(serde_json::json!({ "canceled": true })))
    } else {
        Err(ApiError::NotFound(format!(
            "Pipeline {} has no run in progress",
            name
        )))
    }
}
