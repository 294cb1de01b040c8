//! API Module
//!
//! HTTP layer of the server. Each submodule handles endpoints for one
//! domain; triggers return immediately and the run proceeds in a spawned
//! task, with progress observable through the run endpoints and events.

pub mod error;
pub mod health;
pub mod pipeline;
pub mod run;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use strata_engine::PipelineRunner;
use strata_ledger::PgPool;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub runner: Arc<PipelineRunner>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipeline/commit", post(pipeline::commit_pipeline))
        .route("/pipeline/list", get(pipeline::list_pipelines))
        .route("/pipeline/{name}/trigger", post(pipeline::trigger_pipeline))
        .route("/pipeline/{name}/refresh", post(pipeline::refresh_pipeline))
        .route("/pipeline/{name}/cancel", post(pipeline::cancel_run))
        .route("/pipeline/{name}/runs", get(run::list_step_runs))
        // Step run endpoints
        .route("/run/{id}", get(run::get_step_run))
        .route("/run/{id}/logs", get(run::get_step_run_logs))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
