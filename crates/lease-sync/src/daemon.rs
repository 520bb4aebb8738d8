//! Sync daemon — the periodic loop plus on-demand requests.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use lease_core::epoch_secs;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::job::SyncJob;
use crate::syncer::Syncer;

/// Anything that can ask for a sync and wait for it to finish.
///
/// The idle-shutdown daemon holds one of these; it never writes to durable
/// storage itself.
pub trait SyncTrigger: Send + Sync {
    fn trigger_sync(&self) -> impl Future<Output = SyncResult<()>> + Send;
}

/// Runs the sync action with mutual exclusion.
///
/// Cloning shares the lock, so every clone serialises against the others.
pub struct Synchronizer<S> {
    job: Arc<SyncJob>,
    syncer: Arc<S>,
    in_flight: Arc<Mutex<()>>,
}

impl<S> Clone for Synchronizer<S> {
    fn clone(&self) -> Self {
        Self {
            job: Arc::clone(&self.job),
            syncer: Arc::clone(&self.syncer),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<S: Syncer> Synchronizer<S> {
    pub fn new(job: SyncJob, syncer: S) -> Self {
        Self {
            job: Arc::new(job),
            syncer: Arc::new(syncer),
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn job(&self) -> &SyncJob {
        &self.job
    }

    /// Run one sync, waiting for any sync already in flight to finish first.
    pub async fn sync_once(&self, reason: &'static str) -> SyncResult<()> {
        let _guard = self.in_flight.lock().await;
        let clock = Instant::now();
        let result = self.syncer.sync(&self.job).await;
        let elapsed_ms = clock.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => info!(
                reason,
                outcome = "ok",
                destination = %self.job.destination,
                elapsed_ms,
                at = epoch_secs(),
                "sync tick"
            ),
            Err(e) => warn!(
                reason,
                outcome = "failed",
                destination = %self.job.destination,
                elapsed_ms,
                at = epoch_secs(),
                error = %e,
                "sync tick"
            ),
        }
        result
    }
}

type SyncRequest = oneshot::Sender<SyncResult<()>>;

/// Cheap handle for requesting a sync from a running [`SyncDaemon`].
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncRequest>,
}

impl SyncHandle {
    /// Request a sync and wait for its result.
    pub async fn request_sync(&self) -> SyncResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(reply_tx).await.map_err(|_| SyncError::Closed)?;
        reply_rx.await.map_err(|_| SyncError::Closed)?
    }
}

impl SyncTrigger for SyncHandle {
    async fn trigger_sync(&self) -> SyncResult<()> {
        self.request_sync().await
    }
}

/// The long-running sync loop.
pub struct SyncDaemon<S> {
    synchronizer: Synchronizer<S>,
    requests: mpsc::Receiver<SyncRequest>,
}

impl<S: Syncer> SyncDaemon<S> {
    pub fn new(job: SyncJob, syncer: S) -> (Self, SyncHandle) {
        let (tx, rx) = mpsc::channel(8);
        let daemon = Self {
            synchronizer: Synchronizer::new(job, syncer),
            requests: rx,
        };
        (daemon, SyncHandle { tx })
    }

    pub fn synchronizer(&self) -> Synchronizer<S> {
        self.synchronizer.clone()
    }

    /// Sync on every tick and on every request until `shutdown` fires.
    ///
    /// The first tick fires immediately. A failed tick does not shift the
    /// schedule; a tick that overruns delays the next one instead of
    /// bunching them up.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let schedule = self.synchronizer.job().schedule;
        info!(
            interval_secs = schedule.interval().as_secs(),
            schedule = %schedule,
            source = %self.synchronizer.job().source.display(),
            destination = %self.synchronizer.job().destination,
            "sync daemon started"
        );

        let mut ticker = tokio::time::interval(schedule.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are already logged; the next tick retries.
                    let _ = self.synchronizer.sync_once("scheduled").await;
                }
                Some(reply) = self.requests.recv() => {
                    let result = self.synchronizer.sync_once("requested").await;
                    let _ = reply.send(result);
                }
                _ = shutdown.changed() => {
                    info!("sync daemon shutting down");
                    break;
                }
            }
        }
    }
}
