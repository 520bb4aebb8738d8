//! Daemon modes. Each one runs until a shutdown signal, except the idle
//! daemon, which returns once it has terminated the instance.

use std::path::Path;

use anyhow::Context;
use lease_core::{DaemonConfig, LeaseDescriptor};
use lease_idle::{
    CommandProbe, CommandTerminator, FinalSync, IdleExit, IdleSettings, IdleShutdownDaemon,
};
use lease_sync::{
    CommandSyncer, SocketTrigger, SyncDaemon, SyncJob, SyncTrigger, Syncer, serve_control_socket,
};
use tokio::sync::watch;
use tracing::{error, info};

use crate::signal::forward_shutdown;

fn load(
    config: Option<&Path>,
    descriptor: Option<&Path>,
) -> anyhow::Result<(DaemonConfig, Option<LeaseDescriptor>)> {
    let config = DaemonConfig::load(config).context("loading daemon config")?;
    let descriptor = descriptor
        .map(|p| {
            LeaseDescriptor::from_file(p).with_context(|| format!("loading {}", p.display()))
        })
        .transpose()?;
    Ok((config, descriptor))
}

fn sync_job(
    config: &DaemonConfig,
    descriptor: Option<&LeaseDescriptor>,
) -> anyhow::Result<SyncJob> {
    let target = descriptor.map(|d| d.durable_storage_target.as_str());
    Ok(SyncJob::from_config(&config.sync, target)?)
}

pub async fn run_sync(config: Option<&Path>, descriptor: Option<&Path>) -> anyhow::Result<()> {
    let (config, descriptor) = load(config, descriptor)?;
    let job = sync_job(&config, descriptor.as_ref())?;
    info!("leased starting in sync mode");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    forward_shutdown(shutdown_tx);

    serve_sync(job, CommandSyncer, &config.sync.control_socket, shutdown_rx).await;
    info!("sync daemon stopped");
    Ok(())
}

/// Run the sync loop and its control socket until `shutdown` fires.
///
/// Losing the socket only loses on-demand syncs; scheduled syncs go on.
async fn serve_sync<S: Syncer>(
    job: SyncJob,
    syncer: S,
    socket: &Path,
    shutdown: watch::Receiver<bool>,
) {
    let (daemon, handle) = SyncDaemon::new(job, syncer);
    let daemon_handle = tokio::spawn(daemon.run(shutdown.clone()));

    if let Err(e) = serve_control_socket(socket, handle, shutdown).await {
        error!(
            error = %e,
            "control socket unavailable; on-demand syncs disabled, scheduled syncs continue"
        );
    }
    let _ = daemon_handle.await;
}

pub async fn run_idle(config: Option<&Path>) -> anyhow::Result<()> {
    let (config, _) = load(config, None)?;
    let settings = IdleSettings::from_config(&config.idle)?;
    info!("leased starting in idle mode");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    forward_shutdown(shutdown_tx);

    let trigger = SocketTrigger::new(&config.sync.control_socket);
    let exit = run_idle_daemon(&config, trigger, settings, shutdown_rx).await;
    report_exit(exit)
}

pub async fn run_standalone(
    config: Option<&Path>,
    descriptor: Option<&Path>,
) -> anyhow::Result<()> {
    let (config, descriptor) = load(config, descriptor)?;
    let job = sync_job(&config, descriptor.as_ref())?;
    let settings = IdleSettings::from_config(&config.idle)?;
    info!("leased starting in standalone mode");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    forward_shutdown(shutdown_tx.clone());

    let (sync_daemon, handle) = SyncDaemon::new(job, CommandSyncer);
    let sync_task = tokio::spawn(sync_daemon.run(shutdown_rx.clone()));

    let exit = run_idle_daemon(&config, handle, settings, shutdown_rx).await;

    // Idle daemon is done either way; stop the sync loop too.
    let _ = shutdown_tx.send(true);
    let _ = sync_task.await;
    report_exit(exit)
}

async fn run_idle_daemon<S: SyncTrigger>(
    config: &DaemonConfig,
    trigger: S,
    settings: IdleSettings,
    shutdown: watch::Receiver<bool>,
) -> IdleExit {
    let daemon = IdleShutdownDaemon::new(
        CommandProbe::new(&config.idle.probe_command),
        trigger,
        CommandTerminator::new(&config.idle.terminate_command),
        settings,
    );
    daemon.run(shutdown).await
}

fn report_exit(exit: IdleExit) -> anyhow::Result<()> {
    match exit {
        IdleExit::Stopped => {
            info!("idle-shutdown daemon stopped");
            Ok(())
        }
        IdleExit::ShutDown {
            final_sync,
            terminated: true,
        } => {
            info!(
                synced = matches!(final_sync, FinalSync::Completed),
                "termination issued"
            );
            Ok(())
        }
        IdleExit::ShutDown {
            terminated: false, ..
        } => {
            error!("instance is still running after a failed termination");
            anyhow::bail!("termination action failed")
        }
    }
}
