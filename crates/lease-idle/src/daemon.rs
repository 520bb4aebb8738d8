//! Idle-shutdown daemon — samples activity, runs the idle timer, and on
//! expiry syncs then terminates.

use std::time::Duration;

use lease_core::{IdleConfig, ProvisioningResult, epoch_secs};
use lease_sync::SyncTrigger;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::decision::{IdleState, ShutdownDecision};
use crate::probe::{ActivityProbe, sample_fail_safe};
use crate::terminate::Terminator;

/// Timing knobs of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSettings {
    /// Also the timeout of a single sample.
    pub sample_interval: Duration,
    pub threshold: Duration,
    pub sync_wait_timeout: Duration,
}

impl IdleSettings {
    pub fn from_config(config: &IdleConfig) -> ProvisioningResult<Self> {
        Ok(Self {
            sample_interval: config.sample_interval()?,
            threshold: config.threshold()?,
            sync_wait_timeout: config.sync_wait_timeout()?,
        })
    }
}

/// How the final pre-shutdown sync went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalSync {
    Completed,
    Failed(String),
    /// No confirmation within the wait bound; termination went ahead.
    TimedOut,
}

/// Why [`IdleShutdownDaemon::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleExit {
    /// Termination was issued. `terminated` is false if the termination
    /// action itself reported failure.
    ShutDown {
        final_sync: FinalSync,
        terminated: bool,
    },
    /// The daemon was stopped before the idle threshold was reached.
    Stopped,
}

pub struct IdleShutdownDaemon<P, S, T> {
    probe: P,
    sync: S,
    terminator: T,
    settings: IdleSettings,
}

impl<P, S, T> IdleShutdownDaemon<P, S, T>
where
    P: ActivityProbe,
    S: SyncTrigger,
    T: Terminator,
{
    pub fn new(probe: P, sync: S, terminator: T, settings: IdleSettings) -> Self {
        Self {
            probe,
            sync,
            terminator,
            settings,
        }
    }

    /// Sample until the lease is shut down or `shutdown` fires.
    ///
    /// The idle timer lives only in this call; restarting the daemon
    /// restarts the timer.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> IdleExit {
        info!(
            sample_interval_secs = self.settings.sample_interval.as_secs(),
            threshold_secs = self.settings.threshold.as_secs(),
            sync_wait_secs = self.settings.sync_wait_timeout.as_secs(),
            "idle-shutdown daemon started"
        );

        let mut decision = ShutdownDecision::new(self.settings.threshold);
        let mut ticker = tokio::time::interval(self.settings.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let signal = sample_fail_safe(&self.probe, self.settings.sample_interval).await;
                    let now = Instant::now();
                    let previous = decision.state();
                    let state = decision.observe(signal, now);

                    info!(
                        %signal,
                        state = %state,
                        idle_for_secs = decision.idle_for(now).as_secs(),
                        at = epoch_secs(),
                        "idle tick"
                    );
                    if state != previous {
                        info!(from = %previous, to = %state, "idle state changed");
                    }

                    if state == IdleState::ShuttingDown {
                        return self.shut_down().await;
                    }
                }
                _ = shutdown.changed() => {
                    info!("idle-shutdown daemon stopping");
                    return IdleExit::Stopped;
                }
            }
        }
    }

    /// Final sync (bounded wait), then terminate. Never cancelled.
    async fn shut_down(&self) -> IdleExit {
        info!(at = epoch_secs(), "idle threshold reached; requesting final sync");

        let wait = self.settings.sync_wait_timeout;
        let final_sync = match tokio::time::timeout(wait, self.sync.trigger_sync()).await {
            Ok(Ok(())) => {
                info!("final sync confirmed");
                FinalSync::Completed
            }
            Ok(Err(e)) => {
                warn!(
                    error = %e,
                    "final sync failed; state since the last good sync may be lost"
                );
                FinalSync::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    waited_secs = wait.as_secs(),
                    "forced shutdown before confirmed sync; \
                     state since the last good sync may be lost"
                );
                FinalSync::TimedOut
            }
        };

        info!(at = epoch_secs(), "terminating instance");
        let terminated = match self.terminator.terminate().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "termination action failed; not retrying");
                false
            }
        };

        IdleExit::ShutDown {
            final_sync,
            terminated,
        }
    }
}
