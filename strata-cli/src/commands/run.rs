//! Trigger and refresh command handlers
//!
//! Runs execute in-process; step transitions stream to the terminal as they
//! happen and the final summary names the failed step, its exit status and
//! the tail of its log.

use std::sync::Arc;

use anyhow::{Result, bail};
use colored::Colorize;

use strata_core::domain::event::RunEvent;
use strata_core::domain::run::{RunStatus, StepStatus};
use strata_engine::events::WebhookReporter;
use strata_engine::{EngineConfig, EventBus, PipelineRunner, RunSummary};
use strata_ledger::PgPool;

pub async fn trigger(config: EngineConfig, pool: PgPool, name: &str) -> Result<()> {
    let runner = build_runner(config, pool);
    println!("Triggering {}", name.cyan());

    let summary = runner.trigger(name).await?;
    report(&summary)
}

pub async fn refresh(config: EngineConfig, pool: PgPool, name: &str) -> Result<()> {
    let runner = build_runner(config, pool);
    println!("Refreshing {}", name.cyan());

    let summary = runner.refresh(name).await?;
    report(&summary)
}

fn build_runner(config: EngineConfig, pool: PgPool) -> Arc<PipelineRunner> {
    let events = EventBus::default();
    if let Some(url) = config.webhook_url.clone() {
        WebhookReporter::spawn(url, &events);
    }
    spawn_event_printer(&events);
    Arc::new(PipelineRunner::new(config, pool, events))
}

/// Prints step transitions as they happen.
fn spawn_event_printer(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let RunEvent::StepTransition { step, status, .. } = event {
                println!("  {} {}", step, paint_step_status(status));
            }
        }
    });
}

pub fn report(summary: &RunSummary) -> Result<()> {
    println!();
    for step in &summary.steps {
        println!("  {:<24} {}", step.name, paint_step_status(step.status));
    }

    match summary.status {
        RunStatus::Succeeded => {
            println!("\nRun {} {}", summary.run_id.cyan(), "succeeded".green());
            Ok(())
        }
        _ => {
            if let Some(failure) = &summary.failure {
                println!(
                    "\nStep {} {}",
                    failure.step.red(),
                    failure
                        .outcome
                        .map(|o| o.to_string())
                        .unwrap_or_else(|| "failed".to_string())
                );
                if !failure.log_tail.is_empty() {
                    println!("Last output:");
                    for line in &failure.log_tail {
                        println!("  {}", line.dimmed());
                    }
                }
            }
            bail!("run {} failed", summary.run_id);
        }
    }
}

fn paint_step_status(status: StepStatus) -> colored::ColoredString {
    match status {
        StepStatus::Pending => "pending".normal(),
        StepStatus::Running => "running".cyan(),
        StepStatus::Succeeded => "succeeded".green(),
        StepStatus::Failed => "failed".red(),
        StepStatus::Skipped => "skipped".yellow(),
    }
}
