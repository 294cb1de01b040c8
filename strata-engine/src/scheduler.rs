//! Step scheduler
//!
//! Walks the pipeline's topological groups and executes each group's steps
//! concurrently, bounded by the worker limit. Per step: a ledger record is
//! created on entry to `Running`, every output line is appended as it is
//! produced (bounding memory for long steps and making live tailing work),
//! and the record is finished exactly once with the step's outcome.
//!
//! Failure semantics: a failed step never aborts siblings already running in
//! its group; its transitive dependents are skipped without executing and
//! without ledger records. Cancellation kills running children, marks them
//! canceled and skips everything not yet started. A ledger write failure
//! aborts the run: no trustworthy record, no reported success.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use strata_core::domain::event::RunEvent;
use strata_core::domain::pipeline::Pipeline;
use strata_core::domain::run::{RunStatus, StepOutcome, StepRunId, StepStatus};
use strata_core::graph;
use strata_ledger::LedgerError;

use crate::error::EngineError;
use crate::events::EventBus;
use crate::executor::ScriptRunner;
use crate::ledger::RunLedger;

/// Terminal state of one step within a run report.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub status: StepStatus,
    pub outcome: Option<StepOutcome>,
    pub step_run_id: Option<StepRunId>,
}

/// Result of executing a pipeline's step graph.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// First failed step, if any.
    pub fn failed_step(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}

/// Executes one run's step graph
pub struct StepScheduler {
    runner: Arc<dyn ScriptRunner>,
    ledger: Arc<dyn RunLedger>,
    events: EventBus,
    worker_limit: usize,
}

impl StepScheduler {
    pub fn new(
        runner: Arc<dyn ScriptRunner>,
        ledger: Arc<dyn RunLedger>,
        events: EventBus,
        worker_limit: usize,
    ) -> Self {
        Self {
            runner,
            ledger,
            events,
            worker_limit: worker_limit.max(1),
        }
    }

    /// Runs every step of the pipeline in topological group order.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        run_id: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunReport, EngineError> {
        let groups = graph::execution_groups(&pipeline.steps)?;
        let semaphore = Arc::new(Semaphore::new(self.worker_limit));

        let mut reports: BTreeMap<String, StepReport> = pipeline
            .steps
            .iter()
            .map(|s| {
                (
                    s.name.clone(),
                    StepReport {
                        name: s.name.clone(),
                        status: StepStatus::Pending,
                        outcome: None,
                        step_run_id: None,
                    },
                )
            })
            .collect();

        for group in groups {
            let mut join: JoinSet<(String, Result<(StepRunId, StepOutcome), LedgerError>)> =
                JoinSet::new();

            for name in group {
                let Some(step) = pipeline.step(&name) else {
                    continue;
                };

                let blocked = step.depends.iter().any(|dep| {
                    reports.get(dep).is_some_and(|r| {
                        matches!(r.status, StepStatus::Failed | StepStatus::Skipped)
                    })
                });

                if blocked || *cancel.borrow() {
                    if let Some(report) = reports.get_mut(&name) {
                        report.status = StepStatus::Skipped;
                    }
                    self.events.emit(RunEvent::step_transition(
                        &pipeline.name,
                        run_id,
                        &name,
                        None,
                        StepStatus::Skipped,
                    ));
                    info!("step {} skipped", name);
                    continue;
                }

                join.spawn(execute_step(StepTask {
                    runner: Arc::clone(&self.runner),
                    ledger: Arc::clone(&self.ledger),
                    events: self.events.clone(),
                    semaphore: Arc::clone(&semaphore),
                    pipeline: pipeline.name.clone(),
                    run_id: run_id.to_string(),
                    step: name.clone(),
                    script: step.script.clone(),
                    cancel: cancel.clone(),
                }));
            }

            let mut ledger_failure: Option<LedgerError> = None;
            while let Some(joined) = join.join_next().await {
                match joined {
                    Ok((name, Ok((id, outcome)))) => {
                        if let Some(report) = reports.get_mut(&name) {
                            report.step_run_id = Some(id);
                            report.status = outcome.step_status();
                            report.outcome = Some(outcome);
                        }
                    }
                    Ok((name, Err(e))) => {
                        error!("ledger write failed during step {}: {}", name, e);
                        ledger_failure = Some(e);
                    }
                    Err(join_err) => {
                        error!("step task aborted: {}", join_err);
                        return Err(EngineError::Internal(join_err.to_string()));
                    }
                }
            }

            // A run that cannot record itself must not continue, let alone
            // report success.
            if let Some(e) = ledger_failure {
                return Err(EngineError::Ledger(e));
            }
        }

        let status = if reports.values().all(|r| r.status == StepStatus::Succeeded) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };

        Ok(RunReport {
            status,
            steps: reports.into_values().collect(),
        })
    }
}

struct StepTask {
    runner: Arc<dyn ScriptRunner>,
    ledger: Arc<dyn RunLedger>,
    events: EventBus,
    semaphore: Arc<Semaphore>,
    pipeline: String,
    run_id: String,
    step: String,
    script: String,
    cancel: watch::Receiver<bool>,
}

/// Runs one step to a terminal state, pumping its output into the ledger.
/// Only ledger failures are returned as errors; script failures are
/// outcomes.
async fn execute_step(task: StepTask) -> (String, Result<(StepRunId, StepOutcome), LedgerError>) {
    let name = task.step.clone();
    let result = execute_step_inner(task).await;
    (name, result)
}

async fn execute_step_inner(mut task: StepTask) -> Result<(StepRunId, StepOutcome), LedgerError> {
    let _permit = task.semaphore.clone().acquire_owned().await.ok();

    let id = task
        .ledger
        .begin_step_run(&task.pipeline, &task.step)
        .await?;
    task.events.emit(RunEvent::step_transition(
        &task.pipeline,
        &task.run_id,
        &task.step,
        Some(id),
        StepStatus::Running,
    ));
    info!("step {} running", task.step);

    let env = [
        ("STRATA_PIPELINE".to_string(), task.pipeline.clone()),
        ("STRATA_RUN_ID".to_string(), task.run_id.clone()),
        ("STRATA_STEP".to_string(), task.step.clone()),
    ];

    let outcome = match task.runner.spawn_script(&task.script, &env) {
        Ok(mut child) => {
            pump_output(&mut child, id, task.ledger.as_ref(), &mut task.cancel).await?
        }
        Err(e) => {
            task.ledger
                .append_log(id, &format!("failed to spawn step script: {}", e))
                .await?;
            StepOutcome::Failed { exit_code: 127 }
        }
    };

    task.ledger.finish_step_run(id, &outcome).await?;
    task.events.emit(RunEvent::step_transition(
        &task.pipeline,
        &task.run_id,
        &task.step,
        Some(id),
        outcome.step_status(),
    ));

    match &outcome {
        StepOutcome::Succeeded => info!("step {} succeeded", task.step),
        other => warn!("step {} {}", task.step, other),
    }

    Ok((id, outcome))
}

/// Streams the child's stdout and stderr line by line into the ledger, in
/// emission order per pipe, until both reach EOF; then reaps the exit
/// status. A cancel signal kills the child and turns the outcome into
/// `Canceled` regardless of the exit status the kill produces.
async fn pump_output(
    child: &mut tokio::process::Child,
    id: StepRunId,
    ledger: &dyn RunLedger,
    cancel: &mut watch::Receiver<bool>,
) -> Result<StepOutcome, LedgerError> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        ledger
            .append_log(id, "step script has no output pipes")
            .await?;
        let _ = child.start_kill();
        let _ = child.wait().await;
        return Ok(StepOutcome::Failed { exit_code: 127 });
    };

    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();
    let mut out_done = false;
    let mut err_done = false;

    let mut canceled = *cancel.borrow();
    let mut cancel_armed = !canceled;
    if canceled {
        let _ = child.start_kill();
    }

    while !(out_done && err_done) {
        tokio::select! {
            line = out_lines.next_line(), if !out_done => match line {
                Ok(Some(text)) => ledger.append_log(id, &text).await?,
                Ok(None) => out_done = true,
                Err(e) => {
                    warn!("stdout read error: {}", e);
                    out_done = true;
                }
            },
            line = err_lines.next_line(), if !err_done => match line {
                Ok(Some(text)) => ledger.append_log(id, &text).await?,
                Ok(None) => err_done = true,
                Err(e) => {
                    warn!("stderr read error: {}", e);
                    err_done = true;
                }
            },
            changed = cancel.changed(), if cancel_armed => match changed {
                Ok(()) => {
                    if *cancel.borrow() {
                        canceled = true;
                        cancel_armed = false;
                        let _ = child.start_kill();
                    }
                }
                // Sender gone; no cancellation can arrive anymore.
                Err(_) => cancel_armed = false,
            },
        }
    }

    let status = child.wait().await;

    if canceled {
        return Ok(StepOutcome::Canceled);
    }

    Ok(match status {
        Ok(status) => match status.code() {
            Some(0) => StepOutcome::Succeeded,
            Some(code) => StepOutcome::Failed { exit_code: code },
            None => StepOutcome::Signaled,
        },
        Err(e) => {
            ledger
                .append_log(id, &format!("failed to reap step script: {}", e))
                .await?;
            StepOutcome::Failed { exit_code: 127 }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use std::process::Stdio;
    use std::time::Duration;
    use strata_core::domain::pipeline::Step;
    use tokio::process::Command;

    /// Runs the step's "script" as an inline shell command on the host.
    struct ShellScriptRunner;

    impl ScriptRunner for ShellScriptRunner {
        fn spawn_script(
            &self,
            script: &str,
            _env: &[(String, String)],
        ) -> std::io::Result<tokio::process::Child> {
            Command::new("/bin/sh")
                .arg("-c")
                .arg(script)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
        }
    }

    fn pipeline(steps: Vec<Step>) -> Pipeline {
        Pipeline {
            name: "katarineko".to_string(),
            packages: vec![],
            repos: vec![],
            steps,
        }
    }

    fn step(name: &str, script: &str, depends: &[&str]) -> Step {
        Step {
            name: name.to_string(),
            script: script.to_string(),
            depends: depends.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn scheduler(ledger: &MemoryLedger, worker_limit: usize) -> StepScheduler {
        StepScheduler::new(
            Arc::new(ShellScriptRunner),
            Arc::new(ledger.clone()),
            EventBus::default(),
            worker_limit,
        )
    }

    fn no_cancel() -> watch::Receiver<bool> {
        // Dropping the sender is fine: the scheduler disarms its cancel
        // branch when no cancellation can arrive anymore.
        let (_tx, rx) = watch::channel(false);
        rx
    }

    #[tokio::test]
    async fn test_two_step_pipeline_succeeds_in_order() {
        let ledger = MemoryLedger::new();
        let pipeline = pipeline(vec![
            step("build", "echo compiling", &[]),
            step("test", "echo testing", &["build"]),
        ]);

        let report = scheduler(&ledger, 4)
            .run(&pipeline, "a1b2c3d4", no_cancel())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Succeeded);

        let build = ledger.step_run("build").unwrap();
        let test = ledger.step_run("test").unwrap();
        assert_eq!(ledger.snapshot().len(), 2);
        assert_eq!(build.outcome, Some(StepOutcome::Succeeded));
        assert!(build.finished_at.unwrap() <= test.started_at);
        assert_eq!(build.logs, vec!["compiling"]);
    }

    #[tokio::test]
    async fn test_failed_step_skips_dependents() {
        let ledger = MemoryLedger::new();
        let pipeline = pipeline(vec![
            step("build", "echo boom; exit 1", &[]),
            step("test", "echo never", &["build"]),
        ]);

        let report = scheduler(&ledger, 4)
            .run(&pipeline, "a1b2c3d4", no_cancel())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.failed_step().unwrap().name, "build");

        // Exactly one ledger record, with output; none for the skipped step.
        let records = ledger.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].step, "build");
        assert!(!records[0].logs.is_empty());
        assert_eq!(records[0].outcome, Some(StepOutcome::Failed { exit_code: 1 }));

        let test = report.steps.iter().find(|s| s.name == "test").unwrap();
        assert_eq!(test.status, StepStatus::Skipped);
        assert!(test.step_run_id.is_none());
    }

    #[tokio::test]
    async fn test_skip_propagates_transitively() {
        let ledger = MemoryLedger::new();
        let pipeline = pipeline(vec![
            step("a", "exit 1", &[]),
            step("b", "echo never", &["a"]),
            step("c", "echo never", &["b"]),
        ]);

        let report = scheduler(&ledger, 4)
            .run(&pipeline, "a1b2c3d4", no_cancel())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        for name in ["b", "c"] {
            let s = report.steps.iter().find(|s| s.name == name).unwrap();
            assert_eq!(s.status, StepStatus::Skipped, "step {}", name);
        }
    }

    #[tokio::test]
    async fn test_unrelated_step_still_runs_after_failure() {
        let ledger = MemoryLedger::new();
        let pipeline = pipeline(vec![
            step("bad", "exit 3", &[]),
            step("good", "echo fine", &[]),
            step("child", "echo never", &["bad"]),
        ]);

        let report = scheduler(&ledger, 4)
            .run(&pipeline, "a1b2c3d4", no_cancel())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        let good = ledger.step_run("good").unwrap();
        assert_eq!(good.outcome, Some(StepOutcome::Succeeded));
        assert!(ledger.step_run("child").is_none());
    }

    #[tokio::test]
    async fn test_log_lines_preserve_emission_order() {
        let ledger = MemoryLedger::new();
        let pipeline = pipeline(vec![step(
            "noisy",
            r"printf 'one\ntwo\nthree\n'",
            &[],
        )]);

        scheduler(&ledger, 4)
            .run(&pipeline, "a1b2c3d4", no_cancel())
            .await
            .unwrap();

        let noisy = ledger.step_run("noisy").unwrap();
        assert_eq!(noisy.logs, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_stderr_is_captured_too() {
        let ledger = MemoryLedger::new();
        let pipeline = pipeline(vec![step("warny", "echo oops >&2", &[])]);

        scheduler(&ledger, 4)
            .run(&pipeline, "a1b2c3d4", no_cancel())
            .await
            .unwrap();

        let warny = ledger.step_run("warny").unwrap();
        assert_eq!(warny.logs, vec!["oops"]);
    }

    #[tokio::test]
    async fn test_cancellation_kills_running_and_skips_pending() {
        let ledger = MemoryLedger::new();
        let pipeline = pipeline(vec![
            // exec so the kill lands on the sleep itself, closing the pipes.
            step("slow", "echo started; exec sleep 30", &[]),
            step("after", "echo never", &["slow"]),
        ]);

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = tx.send(true);
        });

        let report = scheduler(&ledger, 4)
            .run(&pipeline, "a1b2c3d4", rx)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Failed);

        let slow = report.steps.iter().find(|s| s.name == "slow").unwrap();
        assert_eq!(slow.status, StepStatus::Failed);
        assert_eq!(slow.outcome, Some(StepOutcome::Canceled));

        let after = report.steps.iter().find(|s| s.name == "after").unwrap();
        assert_eq!(after.status, StepStatus::Skipped);
        assert!(ledger.step_run("after").is_none());
    }

    #[tokio::test]
    async fn test_worker_limit_serializes_a_group() {
        let ledger = MemoryLedger::new();
        let pipeline = pipeline(vec![
            step("one", "sleep 0.2; echo one", &[]),
            step("two", "sleep 0.2; echo two", &[]),
        ]);

        scheduler(&ledger, 1)
            .run(&pipeline, "a1b2c3d4", no_cancel())
            .await
            .unwrap();

        let mut records = ledger.snapshot();
        records.sort_by_key(|r| r.started_at);
        assert_eq!(records.len(), 2);
        assert!(
            records[0].finished_at.unwrap() <= records[1].started_at,
            "with one worker the second step must not start before the first finishes"
        );
    }

    #[tokio::test]
    async fn test_empty_pipeline_succeeds() {
        let ledger = MemoryLedger::new();
        let report = scheduler(&ledger, 4)
            .run(&pipeline(vec![]), "a1b2c3d4", no_cancel())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Succeeded);
        assert!(ledger.snapshot().is_empty());
    }
}
