//! Fixed-interval schedules.

use std::fmt;
use std::time::Duration;

/// A fixed wall-clock interval between runs of a periodic job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    interval: Duration,
}

impl Schedule {
    /// Shortest interval a schedule runs at.
    pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

    /// Run every `interval`. Shorter intervals are raised to
    /// [`Schedule::MIN_INTERVAL`]; configuration rejects them up front.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval: interval.max(Self::MIN_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The equivalent cron entry, e.g. `*/5 * * * *` for five minutes.
    ///
    /// Intervals that cron's minute field cannot express fall back to the
    /// `@every <n>s` form.
    pub fn cron_expression(&self) -> String {
        let secs = self.interval.as_secs();
        if secs % 60 == 0 && self.interval.subsec_nanos() == 0 {
            let mins = secs / 60;
            if mins == 1 {
                return "* * * * *".to_string();
            }
            if mins > 1 && mins < 60 && 60 % mins == 0 {
                return format!("*/{mins} * * * *");
            }
        }
        format!("@every {secs}s")
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cron_expression())
    }
}
