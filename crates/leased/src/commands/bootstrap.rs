use std::path::{Path, PathBuf};

use anyhow::Context;
use lease_bootstrap::{CompletionMarker, Orchestrator, ReferenceParams, RunOnce, reference_plan};
use lease_core::LeaseDescriptor;
use tracing::info;

pub const MARKER_FILE: &str = "bootstrap.json";

pub fn marker_path(state_dir: &Path) -> PathBuf {
    state_dir.join(MARKER_FILE)
}

pub async fn bootstrap(descriptor_path: &Path, state_dir: &Path) -> anyhow::Result<()> {
    let descriptor = LeaseDescriptor::from_file(descriptor_path)
        .with_context(|| format!("loading {}", descriptor_path.display()))?;
    let plan = reference_plan(&descriptor, &ReferenceParams::default())?;
    let fingerprint = descriptor.fingerprint();

    info!(
        lease = %descriptor.security_group_name(),
        steps = plan.len(),
        %fingerprint,
        "bootstrap starting"
    );

    let marker = marker_path(state_dir);
    match Orchestrator::default()
        .run_once(&plan, &fingerprint, &marker)
        .await?
    {
        RunOnce::Completed(report) => {
            info!(
                executed = report.executed().len(),
                elapsed_secs = report.finished_at.saturating_sub(report.started_at),
                marker = %marker.display(),
                "bootstrap completed"
            );
        }
        RunOnce::AlreadyBootstrapped(previous) => {
            info!(finished_at = previous.finished_at, "bootstrap already done");
        }
    }
    Ok(())
}

pub fn verify(descriptor_path: &Path, state_dir: &Path) -> anyhow::Result<()> {
    let descriptor = LeaseDescriptor::from_file(descriptor_path)
        .with_context(|| format!("loading {}", descriptor_path.display()))?;
    let path = marker_path(state_dir);
    let marker = CompletionMarker::load(&path)?
        .with_context(|| format!("{} not found; instance was never bootstrapped", path.display()))?;

    descriptor.check_drift(&marker.fingerprint)?;
    println!(
        "ok: bootstrapped at {} from descriptor {}",
        marker.finished_at, marker.fingerprint
    );
    Ok(())
}
