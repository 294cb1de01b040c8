//! Strata Server
//!
//! The always-on half of Strata: listens for webhook triggers, serves status
//! views over the run ledger, and hosts the engine that executes runs.
//!
//! Startup order matters: migrations, then the reconciliation sweep (crashed
//! runs are closed and orphaned contexts destroyed before anything new can
//! start), then the listener.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strata_engine::events::WebhookReporter;
use strata_engine::{EngineConfig, EventBus, PipelineRunner, recovery};
use strata_ledger::db;

pub mod api;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_server=debug,strata_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Strata Server...");

    let config = EngineConfig::from_env();
    config.validate().expect("Invalid engine configuration");

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let events = EventBus::default();
    if let Some(url) = config.webhook_url.clone() {
        tracing::info!("Forwarding run events to {}", url);
        WebhookReporter::spawn(url, &events);
    }

    let runner = Arc::new(PipelineRunner::new(config, pool.clone(), events));

    let report = recovery::reconcile(&pool, runner.store())
        .await
        .expect("Startup reconciliation failed");
    tracing::info!(
        "Reconciliation done: {} interrupted step run(s), {} orphaned context(s)",
        report.interrupted_step_runs,
        report.destroyed_contexts.len()
    );

    let app = api::create_router(api::AppState { pool, runner });

    let addr = std::env::var("SERVER_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
