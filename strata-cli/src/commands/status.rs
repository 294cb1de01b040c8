//! Status command handlers

use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use uuid::Uuid;

use strata_core::domain::run::{StepOutcome, StepRun};
use strata_ledger::{PgPool, logs, pipelines, step_runs};

pub async fn list(pool: PgPool) -> Result<()> {
    let names = pipelines::list_names(&pool).await?;
    if names.is_empty() {
        println!("No pipelines committed yet");
        return Ok(());
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

pub async fn runs(pool: PgPool, pipeline: &str) -> Result<()> {
    let records = step_runs::find_by_pipeline(&pool, pipeline).await?;
    if records.is_empty() {
        println!("No runs recorded for {}", pipeline.cyan());
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:<20}  {}",
        "ID".bold(),
        "STEP".bold(),
        "STARTED".bold(),
        "OUTCOME".bold()
    );
    for record in records {
        println!(
            "{:<36}  {:<20}  {:<20}  {}",
            record.id,
            record.step_name,
            format_time(&record),
            paint_outcome(&record)
        );
    }
    Ok(())
}

pub async fn logs(pool: PgPool, id: Uuid, from: i64, follow: bool) -> Result<()> {
    let mut next_idx = from;

    loop {
        let lines = logs::read_from(&pool, id, next_idx).await?;
        for line in &lines {
            println!("{:>6}  {}", line.log_idx.to_string().dimmed(), line.text);
        }
        if let Some(last) = lines.last() {
            next_idx = last.log_idx + 1;
        }

        if !follow {
            return Ok(());
        }

        // A finished step run appends nothing more; drain once and stop.
        let record = step_runs::find_by_id(&pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("step run {} not found", id))?;
        if record.finished_at.is_some() {
            let remaining = logs::read_from(&pool, id, next_idx).await?;
            for line in &remaining {
                println!("{:>6}  {}", line.log_idx.to_string().dimmed(), line.text);
            }
            return Ok(());
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn format_time(record: &StepRun) -> String {
    match record.started_at {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

fn paint_outcome(record: &StepRun) -> colored::ColoredString {
    match &record.outcome {
        Some(StepOutcome::Succeeded) => "succeeded".green(),
        Some(StepOutcome::Failed { exit_code }) => format!("failed ({})", exit_code).red(),
        Some(StepOutcome::Signaled) => "signaled".red(),
        Some(StepOutcome::Canceled) => "canceled".red(),
        Some(StepOutcome::Interrupted) => "interrupted".yellow(),
        None if record.finished_at.is_none() => "running".cyan(),
        None => "unknown".normal(),
    }
}
