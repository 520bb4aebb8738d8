//! Lease lifecycle tests.
//!
//! Exercises the bootstrap → daemons → shutdown timeline across crates,
//! with real shell commands where timing allows and fakes on a paused
//! clock where it does not.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lease_bootstrap::{BootstrapError, BootstrapPlan, BootstrapStep, Orchestrator, RunOnce};
use lease_core::{LeaseDescriptor, ProvisioningError, Schedule, SyncConfig};
use lease_idle::{
    ActivityProbe, ActivitySignal, CommandProbe, CommandTerminator, FinalSync, IdleExit,
    IdleSettings, IdleShutdownDaemon, SamplingError, TerminateError, Terminator,
};
use lease_sync::{CommandSyncer, SyncDaemon, SyncJob, SyncResult, Syncer};
use tokio::sync::watch;
use tokio::time::Instant;

const MINUTE: Duration = Duration::from_secs(60);

// ── Bootstrap ──────────────────────────────────────────────────

fn touch_plan(dir: &std::path::Path, fail_at: Option<usize>) -> BootstrapPlan {
    let steps = (1..=6).map(|i| {
        let command = if Some(i) == fail_at {
            "echo 'E: Unable to locate package' >&2; exit 100".to_string()
        } else {
            format!("touch {}/step-{i}", dir.display())
        };
        BootstrapStep::shell(format!("step-{i}"), command)
    });
    BootstrapPlan::builder().steps(steps).build().unwrap()
}

#[tokio::test]
async fn bootstrap_runs_once_per_instance() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("state/bootstrap.json");
    let descriptor = LeaseDescriptor::reference("saves");
    let plan = touch_plan(dir.path(), None);
    let orchestrator = Orchestrator::default();

    let first = orchestrator
        .run_once(&plan, &descriptor.fingerprint(), &marker)
        .await
        .unwrap();
    let RunOnce::Completed(report) = first else {
        panic!("first run must execute the plan");
    };
    assert_eq!(report.executed().len(), 6);
    assert!(marker.exists());

    // A second boot of the same instance does nothing.
    std::fs::remove_file(dir.path().join("step-1")).unwrap();
    let second = orchestrator
        .run_once(&plan, &descriptor.fingerprint(), &marker)
        .await
        .unwrap();
    assert!(matches!(second, RunOnce::AlreadyBootstrapped(_)));
    assert!(!dir.path().join("step-1").exists());
}

#[tokio::test]
async fn changed_descriptor_is_drift() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("bootstrap.json");
    let plan = touch_plan(dir.path(), None);
    let orchestrator = Orchestrator::default();

    let created = LeaseDescriptor::reference("saves");
    orchestrator
        .run_once(&plan, &created.fingerprint(), &marker)
        .await
        .unwrap();

    let mut current = created.clone();
    current.machine_profile.disk_size = 32;
    let err = orchestrator
        .run_once(&plan, &current.fingerprint(), &marker)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BootstrapError::Provisioning(ProvisioningError::Drift { .. })
    ));
}

#[tokio::test]
async fn bootstrap_stops_at_failing_step() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("bootstrap.json");
    let plan = touch_plan(dir.path(), Some(4));

    let err = Orchestrator::default()
        .run_once(&plan, "fp", &marker)
        .await
        .unwrap_err();
    match err {
        BootstrapError::StepFailed {
            index,
            name,
            exit_code,
            reason,
        } => {
            assert_eq!(index, 4);
            assert_eq!(name, "step-4");
            assert_eq!(exit_code, Some(100));
            assert!(reason.contains("Unable to locate package"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }

    for i in 1..=3 {
        assert!(dir.path().join(format!("step-{i}")).exists());
    }
    for i in 5..=6 {
        assert!(!dir.path().join(format!("step-{i}")).exists());
    }
    assert!(!marker.exists(), "a failed bootstrap is not complete");

    let report: serde_json::Value =
        serde_json::from_slice(&std::fs::read(marker.with_extension("failed.json")).unwrap())
            .unwrap();
    assert_eq!(report["records"].as_array().unwrap().len(), 4);
    assert_eq!(report["records"][3]["outcome"], "failed");
}

// ── Daemons with real commands ─────────────────────────────────

#[tokio::test]
async fn idle_lease_syncs_then_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let saves = dir.path().join("saves");
    let bucket = dir.path().join("bucket");
    std::fs::create_dir_all(&saves).unwrap();
    std::fs::create_dir_all(&bucket).unwrap();
    std::fs::write(saves.join("world.sav"), b"factory").unwrap();
    let halted = dir.path().join("halted");

    let config = SyncConfig {
        source_dir: saves.clone(),
        destination: bucket.display().to_string(),
        interval: "1h".to_string(),
        command: vec![
            "cp".to_string(),
            "-R".to_string(),
            "{source}/.".to_string(),
            "{destination}".to_string(),
        ],
        ..SyncConfig::default()
    };
    let job = SyncJob::from_config(&config, None).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (sync_daemon, handle) = SyncDaemon::new(job, CommandSyncer);
    let sync_task = tokio::spawn(sync_daemon.run(shutdown_rx.clone()));

    // Written after the first scheduled sync; only the final sync carries it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(saves.join("late.sav"), b"progress").unwrap();

    let idle = IdleShutdownDaemon::new(
        CommandProbe::new("echo 0"),
        handle,
        CommandTerminator::new(format!("touch {}", halted.display())),
        IdleSettings {
            sample_interval: Duration::from_millis(100),
            threshold: Duration::from_millis(300),
            sync_wait_timeout: Duration::from_secs(10),
        },
    );
    let exit = tokio::time::timeout(Duration::from_secs(10), idle.run(shutdown_rx))
        .await
        .unwrap();

    assert_eq!(
        exit,
        IdleExit::ShutDown {
            final_sync: FinalSync::Completed,
            terminated: true
        }
    );
    assert!(halted.exists());
    assert_eq!(std::fs::read(bucket.join("world.sav")).unwrap(), b"factory");
    assert_eq!(std::fs::read(bucket.join("late.sav")).unwrap(), b"progress");

    let _ = shutdown_tx.send(true);
    sync_task.await.unwrap();
}

#[tokio::test]
async fn busy_lease_stays_up() {
    let dir = tempfile::tempdir().unwrap();
    let halted = dir.path().join("halted");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (sync_daemon, handle) = SyncDaemon::new(
        SyncJob {
            source: dir.path().to_path_buf(),
            destination: "unused".to_string(),
            schedule: Schedule::every(Duration::from_secs(3600)),
            command: vec!["true".to_string()],
        },
        CommandSyncer,
    );
    tokio::spawn(sync_daemon.run(shutdown_rx.clone()));

    let idle = IdleShutdownDaemon::new(
        CommandProbe::new("echo 2"),
        handle,
        CommandTerminator::new(format!("touch {}", halted.display())),
        IdleSettings {
            sample_interval: Duration::from_millis(50),
            threshold: Duration::from_millis(150),
            sync_wait_timeout: Duration::from_secs(1),
        },
    );
    let task = tokio::spawn(idle.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(600)).await;
    let _ = shutdown_tx.send(true);
    assert_eq!(task.await.unwrap(), IdleExit::Stopped);
    assert!(!halted.exists());
}

// ── Full timeline on a paused clock ────────────────────────────

type Events = Arc<Mutex<Vec<(&'static str, Duration)>>>;

struct RecordingSyncer {
    events: Events,
    start: Instant,
}

impl Syncer for RecordingSyncer {
    async fn sync(&self, _job: &SyncJob) -> SyncResult<()> {
        self.events
            .lock()
            .unwrap()
            .push(("sync", self.start.elapsed()));
        Ok(())
    }
}

/// Players online for the first ten minutes, then nobody.
struct SessionsUntil {
    start: Instant,
    until: Duration,
}

impl ActivityProbe for SessionsUntil {
    async fn sample(&self) -> Result<ActivitySignal, SamplingError> {
        Ok(if self.start.elapsed() < self.until {
            ActivitySignal::Active
        } else {
            ActivitySignal::Idle
        })
    }
}

struct RecordingTerminator {
    events: Events,
    start: Instant,
}

impl Terminator for RecordingTerminator {
    async fn terminate(&self) -> Result<(), TerminateError> {
        self.events
            .lock()
            .unwrap()
            .push(("terminate", self.start.elapsed()));
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn reference_timeline() {
    let start = Instant::now();
    let events: Events = Arc::default();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (sync_daemon, handle) = SyncDaemon::new(
        SyncJob {
            source: "/saves".into(),
            destination: "s3://saves/".to_string(),
            schedule: Schedule::every(5 * MINUTE),
            command: vec!["true".to_string()],
        },
        RecordingSyncer {
            events: Arc::clone(&events),
            start,
        },
    );
    let sync_task = tokio::spawn(sync_daemon.run(shutdown_rx.clone()));

    let idle = IdleShutdownDaemon::new(
        SessionsUntil {
            start,
            until: 10 * MINUTE,
        },
        handle,
        RecordingTerminator {
            events: Arc::clone(&events),
            start,
        },
        IdleSettings {
            sample_interval: MINUTE,
            threshold: 20 * MINUTE,
            sync_wait_timeout: 2 * MINUTE,
        },
    );
    let exit = idle.run(shutdown_rx).await;
    let _ = shutdown_tx.send(true);
    sync_task.await.unwrap();

    assert_eq!(
        exit,
        IdleExit::ShutDown {
            final_sync: FinalSync::Completed,
            terminated: true
        }
    );

    let events = events.lock().unwrap().clone();
    let terminate_at = events
        .iter()
        .position(|e| *e == ("terminate", 30 * MINUTE))
        .expect("instance terminated at 30 min");
    assert_eq!(terminate_at, events.len() - 1);

    // Scheduled syncs every five minutes up to 30 min, plus the final one.
    let mut sync_minutes: Vec<u64> = events[..terminate_at]
        .iter()
        .map(|(what, at)| {
            assert_eq!(*what, "sync");
            at.as_secs() / 60
        })
        .collect();
    sync_minutes.sort_unstable();
    assert_eq!(sync_minutes, vec![0, 5, 10, 15, 20, 25, 30, 30]);
}
