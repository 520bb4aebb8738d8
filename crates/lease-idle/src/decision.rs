//! The idle timer.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::probe::ActivitySignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    Active,
    IdlePending,
    ShuttingDown,
}

impl fmt::Display for IdleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdleState::Active => f.write_str("ACTIVE"),
            IdleState::IdlePending => f.write_str("IDLE_PENDING"),
            IdleState::ShuttingDown => f.write_str("SHUTTING_DOWN"),
        }
    }
}

/// Transient shutdown decision, recomputed on every sample.
#[derive(Debug, Clone)]
pub struct ShutdownDecision {
    threshold: Duration,
    idle_since: Option<Instant>,
    shutting_down: bool,
}

impl ShutdownDecision {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            idle_since: None,
            shutting_down: false,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn idle_since(&self) -> Option<Instant> {
        self.idle_since
    }

    pub fn state(&self) -> IdleState {
        if self.shutting_down {
            IdleState::ShuttingDown
        } else if self.idle_since.is_some() {
            IdleState::IdlePending
        } else {
            IdleState::Active
        }
    }

    /// How long the current idle period has lasted at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        self.idle_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default()
    }

    /// Fold one sample taken at `now` into the decision.
    ///
    /// `SHUTTING_DOWN` is terminal: later samples are ignored.
    pub fn observe(&mut self, signal: ActivitySignal, now: Instant) -> IdleState {
        if self.shutting_down {
            return IdleState::ShuttingDown;
        }

        match signal {
            ActivitySignal::Active => {
                self.idle_since = None;
            }
            ActivitySignal::Idle => {
                let since = *self.idle_since.get_or_insert(now);
                if now.saturating_duration_since(since) >= self.threshold {
                    self.shutting_down = true;
                }
            }
        }
        self.state()
    }
}
