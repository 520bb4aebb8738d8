//! Orchestrator — sequential, fail-fast execution of a bootstrap plan.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use lease_core::{ProvisioningError, epoch_secs};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{BootstrapError, BootstrapResult};
use crate::marker::CompletionMarker;
use crate::runner::{ActionOutput, ShellRunner, StepRunner};
use crate::step::{BootstrapPlan, BootstrapStep};

/// What happened to a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The action ran and exited zero.
    Applied,
    /// Idempotent step whose post-condition already held.
    Skipped,
    /// The action exited non-zero or could not be started.
    Failed,
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Applied => "applied",
            StepOutcome::Skipped => "skipped",
            StepOutcome::Failed => "failed",
        }
    }
}

/// Status line for one attempted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based position in the plan.
    pub index: usize,
    pub name: String,
    pub outcome: StepOutcome,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Epoch seconds.
    pub started_at: u64,
    pub elapsed_ms: u64,
}

/// Binary outcome of a bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    Succeeded,
    FailedAt { index: usize, name: String },
}

impl fmt::Display for BootstrapOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapOutcome::Succeeded => f.write_str("succeeded"),
            BootstrapOutcome::FailedAt { index, name } => {
                write!(f, "failed at step {index} ({name})")
            }
        }
    }
}

/// Every attempted step, in order, plus the overall outcome.
///
/// The records are always a prefix of the plan: nothing after a failed
/// step is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub outcome: BootstrapOutcome,
    pub records: Vec<StepRecord>,
    pub started_at: u64,
    pub finished_at: u64,
}

impl BootstrapReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == BootstrapOutcome::Succeeded
    }

    /// Names of steps whose action actually ran (applied or failed).
    pub fn executed(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.outcome != StepOutcome::Skipped)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Turn a failed report into a [`BootstrapError::StepFailed`].
    pub fn into_result(self) -> BootstrapResult<Self> {
        let BootstrapOutcome::FailedAt { index, .. } = &self.outcome else {
            return Ok(self);
        };
        let failed = self
            .records
            .iter()
            .find(|r| r.index == *index)
            .cloned();
        match failed {
            Some(record) => Err(BootstrapError::StepFailed {
                index: record.index,
                name: record.name,
                exit_code: record.exit_code,
                reason: failure_reason(record.exit_code, &record.stderr),
            }),
            None => Err(BootstrapError::Plan(format!(
                "report for failed step {index} is missing"
            ))),
        }
    }
}

/// Result of [`Orchestrator::run_once`].
#[derive(Debug)]
pub enum RunOnce {
    /// The plan ran to completion in this invocation.
    Completed(BootstrapReport),
    /// A marker for the same descriptor already exists; nothing ran.
    AlreadyBootstrapped(CompletionMarker),
}

/// Executes plans strictly in order. No concurrency, no retry, no rollback.
pub struct Orchestrator<R = ShellRunner> {
    runner: R,
}

impl Default for Orchestrator<ShellRunner> {
    fn default() -> Self {
        Self::new(ShellRunner::default())
    }
}

impl<R: StepRunner> Orchestrator<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Run every step of `plan` in order, stopping at the first failure.
    pub async fn execute(&self, plan: &BootstrapPlan) -> BootstrapReport {
        let started_at = epoch_secs();
        let total = plan.len();
        let mut records = Vec::with_capacity(total);
        let mut outcome = BootstrapOutcome::Succeeded;

        info!(steps = total, "bootstrap starting");

        for (i, step) in plan.steps().iter().enumerate() {
            let index = i + 1;
            let record = self.run_step(index, total, step).await;
            let failed = record.outcome == StepOutcome::Failed;
            records.push(record);

            if failed {
                outcome = BootstrapOutcome::FailedAt {
                    index,
                    name: step.name.clone(),
                };
                break;
            }
        }

        let finished_at = epoch_secs();
        match &outcome {
            BootstrapOutcome::Succeeded => {
                info!(steps = total, at = finished_at, "bootstrap succeeded");
            }
            BootstrapOutcome::FailedAt { index, name } => {
                error!(
                    step = %name,
                    index,
                    skipped_remaining = total - index,
                    at = finished_at,
                    "bootstrap halted; replace the lease to recover"
                );
            }
        }

        BootstrapReport {
            outcome,
            records,
            started_at,
            finished_at,
        }
    }

    async fn run_step(&self, index: usize, total: usize, step: &BootstrapStep) -> StepRecord {
        let started_at = epoch_secs();
        let clock = Instant::now();

        if step.idempotent
            && let Some(check) = &step.check
        {
            let probe = self.runner.run(check).await;
            if probe.success() {
                let record = StepRecord {
                    index,
                    name: step.name.clone(),
                    outcome: StepOutcome::Skipped,
                    exit_code: probe.exit_code,
                    stdout: String::new(),
                    stderr: String::new(),
                    started_at,
                    elapsed_ms: clock.elapsed().as_millis() as u64,
                };
                log_record(&record, total);
                return record;
            }
        }

        let ActionOutput {
            exit_code,
            stdout,
            stderr,
        } = self.runner.run(&step.action).await;
        let outcome = if exit_code == Some(0) {
            StepOutcome::Applied
        } else {
            StepOutcome::Failed
        };

        let record = StepRecord {
            index,
            name: step.name.clone(),
            outcome,
            exit_code,
            stdout,
            stderr,
            started_at,
            elapsed_ms: clock.elapsed().as_millis() as u64,
        };
        log_record(&record, total);
        record
    }

    /// Run `plan` unless this instance was already bootstrapped.
    ///
    /// The marker at `marker_path` records the descriptor fingerprint of
    /// the successful run. A marker with a different fingerprint is drift
    /// and is reported, never repaired. A failed run leaves a report next
    /// to the marker path and returns [`BootstrapError::StepFailed`]; later
    /// calls return the same failure without running anything.
    pub async fn run_once(
        &self,
        plan: &BootstrapPlan,
        fingerprint: &str,
        marker_path: &Path,
    ) -> BootstrapResult<RunOnce> {
        if let Some(marker) = CompletionMarker::load(marker_path)? {
            if marker.fingerprint != fingerprint {
                return Err(ProvisioningError::Drift {
                    created: marker.fingerprint,
                    current: fingerprint.to_string(),
                }
                .into());
            }
            info!(
                path = %marker_path.display(),
                finished_at = marker.finished_at,
                "already bootstrapped; not re-running"
            );
            return Ok(RunOnce::AlreadyBootstrapped(marker));
        }

        let failure_path = marker_path.with_extension("failed.json");
        if let Some(previous) = CompletionMarker::load_report(&failure_path)? {
            error!(
                path = %failure_path.display(),
                outcome = %previous.outcome,
                "previous bootstrap failed; not re-running"
            );
            return match previous.into_result() {
                Err(e) => Err(e),
                Ok(_) => Err(BootstrapError::Plan(format!(
                    "{} holds a report without a failed step",
                    failure_path.display()
                ))),
            };
        }

        let report = self.execute(plan).await;
        if report.succeeded() {
            let marker = CompletionMarker::from_report(fingerprint, &report);
            marker.write(marker_path)?;
            return Ok(RunOnce::Completed(report));
        }

        if let Err(e) = CompletionMarker::write_report(&failure_path, &report) {
            warn!(error = %e, "could not persist failure report");
        }
        report.into_result().map(RunOnce::Completed)
    }
}

fn log_record(record: &StepRecord, total: usize) {
    match record.outcome {
        StepOutcome::Failed => error!(
            step = %record.name,
            index = record.index,
            total,
            outcome = record.outcome.label(),
            exit_code = ?record.exit_code,
            at = record.started_at,
            elapsed_ms = record.elapsed_ms,
            stderr = %record.stderr.trim_end(),
            "bootstrap step"
        ),
        _ => info!(
            step = %record.name,
            index = record.index,
            total,
            outcome = record.outcome.label(),
            exit_code = ?record.exit_code,
            at = record.started_at,
            elapsed_ms = record.elapsed_ms,
            "bootstrap step"
        ),
    }
}

fn failure_reason(exit_code: Option<i32>, stderr: &str) -> String {
    let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty());
    match (exit_code, last_line) {
        (Some(code), Some(line)) => format!("exit code {code}: {}", line.trim()),
        (Some(code), None) => format!("exit code {code}"),
        (None, Some(line)) => format!("abnormal exit: {}", line.trim()),
        (None, None) => "abnormal exit".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use proptest::prelude::*;

    use super::*;
    use crate::step::StepAction;

    /// Succeeds on `ok`/`check-pass`, fails on everything else, and records
    /// every action it was asked to run.
    #[derive(Default)]
    struct ScriptedRunner {
        ran: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn ran(&self) -> Vec<String> {
            self.ran.lock().unwrap().clone()
        }
    }

    impl StepRunner for ScriptedRunner {
        async fn run(&self, action: &StepAction) -> ActionOutput {
            let text = action.to_string();
            self.ran.lock().unwrap().push(text.clone());
            let ok = text.starts_with("ok") || text == "check-pass";
            ActionOutput {
                exit_code: Some(if ok { 0 } else { 1 }),
                stdout: String::new(),
                stderr: if ok { String::new() } else { format!("{text} broke") },
            }
        }
    }

    fn plan_of(flags: &[bool]) -> BootstrapPlan {
        let steps = flags.iter().enumerate().map(|(i, ok)| {
            let cmd = if *ok { format!("ok-{i}") } else { format!("fail-{i}") };
            BootstrapStep::shell(format!("step-{}", i + 1), cmd)
        });
        BootstrapPlan::builder().steps(steps).build().unwrap()
    }

    #[tokio::test]
    async fn all_steps_succeed() {
        let orch = Orchestrator::new(ScriptedRunner::default());
        let report = orch.execute(&plan_of(&[true, true, true])).await;
        assert!(report.succeeded());
        assert_eq!(report.records.len(), 3);
        assert!(report.records.iter().all(|r| r.outcome == StepOutcome::Applied));
    }

    #[tokio::test]
    async fn six_steps_fail_at_four() {
        let orch = Orchestrator::new(ScriptedRunner::default());
        let report = orch
            .execute(&plan_of(&[true, true, true, false, true, true]))
            .await;

        assert_eq!(
            report.outcome,
            BootstrapOutcome::FailedAt {
                index: 4,
                name: "step-4".to_string()
            }
        );
        assert_eq!(report.outcome.to_string(), "failed at step 4 (step-4)");
        assert_eq!(report.executed(), vec!["step-1", "step-2", "step-3", "step-4"]);
        assert_eq!(orch.runner.ran(), vec!["ok-0", "ok-1", "ok-2", "fail-3"]);

        let err = report.into_result().unwrap_err();
        match err {
            BootstrapError::StepFailed {
                index,
                name,
                exit_code,
                reason,
            } => {
                assert_eq!(index, 4);
                assert_eq!(name, "step-4");
                assert_eq!(exit_code, Some(1));
                assert!(reason.contains("fail-3 broke"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn idempotent_step_with_passing_check_is_skipped() {
        let plan = BootstrapPlan::builder()
            .step(BootstrapStep::shell("a", "ok-a").skip_if(StepAction::shell("check-pass")))
            .step(BootstrapStep::shell("b", "ok-b").skip_if(StepAction::shell("check-fail")))
            .build()
            .unwrap();
        let orch = Orchestrator::new(ScriptedRunner::default());
        let report = orch.execute(&plan).await;

        assert!(report.succeeded());
        assert_eq!(report.records[0].outcome, StepOutcome::Skipped);
        assert_eq!(report.records[1].outcome, StepOutcome::Applied);
        assert_eq!(orch.runner.ran(), vec!["check-pass", "check-fail", "ok-b"]);
    }

    #[tokio::test]
    async fn non_idempotent_step_ignores_check() {
        let mut step = BootstrapStep::shell("a", "ok-a");
        step.check = Some(StepAction::shell("check-pass"));
        let plan = BootstrapPlan::builder().step(step).build().unwrap();

        let orch = Orchestrator::new(ScriptedRunner::default());
        let report = orch.execute(&plan).await;
        assert_eq!(report.records[0].outcome, StepOutcome::Applied);
        assert_eq!(orch.runner.ran(), vec!["ok-a"]);
    }

    #[tokio::test]
    async fn idempotent_step_without_check_reruns() {
        let plan = BootstrapPlan::builder()
            .step(BootstrapStep::shell("refresh", "ok-refresh").idempotent())
            .build()
            .unwrap();
        let orch = Orchestrator::new(ScriptedRunner::default());
        orch.execute(&plan).await;
        orch.execute(&plan).await;
        assert_eq!(orch.runner.ran(), vec!["ok-refresh", "ok-refresh"]);
    }

    #[tokio::test]
    async fn idempotent_shell_step_twice_same_postcondition() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("home/steam");
        let plan = BootstrapPlan::builder()
            .step(
                BootstrapStep::shell("make-home", format!("mkdir -p {}", target.display()))
                    .skip_if(StepAction::shell(format!("test -d {}", target.display()))),
            )
            .build()
            .unwrap();

        let orch = Orchestrator::default();
        let first = orch.execute(&plan).await;
        assert_eq!(first.records[0].outcome, StepOutcome::Applied);
        assert!(target.is_dir());

        let second = orch.execute(&plan).await;
        assert_eq!(second.records[0].outcome, StepOutcome::Skipped);
        assert!(target.is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn run_once_writes_marker_and_skips_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("bootstrap.json");
        let orch = Orchestrator::new(ScriptedRunner::default());
        let plan = plan_of(&[true, true]);

        let first = orch.run_once(&plan, "abc", &marker).await.unwrap();
        assert!(matches!(first, RunOnce::Completed(_)));
        assert!(marker.exists());

        let second = orch.run_once(&plan, "abc", &marker).await.unwrap();
        assert!(matches!(second, RunOnce::AlreadyBootstrapped(_)));
        assert_eq!(orch.runner.ran().len(), 2);
    }

    #[tokio::test]
    async fn run_once_reports_drift() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("bootstrap.json");
        let orch = Orchestrator::new(ScriptedRunner::default());
        let plan = plan_of(&[true]);

        orch.run_once(&plan, "first", &marker).await.unwrap();
        let err = orch.run_once(&plan, "second", &marker).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::Provisioning(ProvisioningError::Drift { .. })
        ));
    }

    #[tokio::test]
    async fn run_once_failure_leaves_report_and_no_marker() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("bootstrap.json");
        let orch = Orchestrator::new(ScriptedRunner::default());

        let err = orch
            .run_once(&plan_of(&[true, false, true]), "abc", &marker)
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::StepFailed { index: 2, .. }));
        assert!(!marker.exists());
        assert!(dir.path().join("bootstrap.failed.json").exists());
    }

    #[tokio::test]
    async fn run_once_failure_is_final() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("bootstrap.json");
        let orch = Orchestrator::new(ScriptedRunner::default());
        let plan = plan_of(&[true, false]);

        let first = orch.run_once(&plan, "abc", &marker).await.unwrap_err();
        assert_eq!(orch.runner.ran(), vec!["ok-0", "fail-1"]);

        // A reboot must not re-run the non-idempotent first step.
        let second = orch.run_once(&plan, "abc", &marker).await.unwrap_err();
        assert_eq!(orch.runner.ran().len(), 2);
        assert_eq!(second.to_string(), first.to_string());
        assert!(matches!(second, BootstrapError::StepFailed { index: 2, .. }));
        assert!(!marker.exists());
    }

    #[test]
    fn failure_reason_uses_last_stderr_line() {
        assert_eq!(
            failure_reason(Some(100), "E: first\nE: Unable to locate package\n\n"),
            "exit code 100: E: Unable to locate package"
        );
        assert_eq!(failure_reason(None, ""), "abnormal exit");
    }

    proptest! {
        #[test]
        fn attempted_steps_are_a_strict_prefix(
            flags in prop::collection::vec(any::<bool>(), 0..12),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let orch = Orchestrator::new(ScriptedRunner::default());
            let report = rt.block_on(orch.execute(&plan_of(&flags)));

            let expected = match flags.iter().position(|ok| !ok) {
                Some(k) => k + 1,
                None => flags.len(),
            };
            prop_assert_eq!(report.records.len(), expected);
            prop_assert_eq!(orch.runner.ran().len(), expected);

            let names: HashSet<String> = report.records.iter().map(|r| r.name.clone()).collect();
            for later in expected..flags.len() {
                let later_name = format!("step-{}", later + 1);
                prop_assert!(!names.contains(&later_name));
            }
            prop_assert_eq!(report.succeeded(), flags.iter().all(|ok| *ok));
        }
    }
}
