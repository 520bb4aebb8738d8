//! The sync job: what to copy, where, and how often.

use std::path::PathBuf;

use lease_core::{ProvisioningError, ProvisioningResult, Schedule, SyncConfig};

/// Stateless between runs; only the destination's content carries over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub source: PathBuf,
    pub destination: String,
    pub schedule: Schedule,
    /// Program and arguments, with `{source}` and `{destination}`
    /// placeholders.
    pub command: Vec<String>,
}

impl SyncJob {
    /// Build a job from config. `lease_target` is used when the config does
    /// not name a destination.
    pub fn from_config(
        config: &SyncConfig,
        lease_target: Option<&str>,
    ) -> ProvisioningResult<Self> {
        let destination = if config.destination.is_empty() {
            lease_target.unwrap_or_default().to_string()
        } else {
            config.destination.clone()
        };
        if destination.is_empty() {
            return Err(ProvisioningError::Invalid(
                "sync destination is neither configured nor given by a lease descriptor"
                    .to_string(),
            ));
        }
        if config.command.is_empty() {
            return Err(ProvisioningError::Invalid("sync command is empty".to_string()));
        }

        let interval = config.interval()?;
        if interval < Schedule::MIN_INTERVAL {
            return Err(ProvisioningError::Invalid(format!(
                "sync interval {} is shorter than {}s",
                config.interval,
                Schedule::MIN_INTERVAL.as_secs()
            )));
        }

        Ok(Self {
            source: config.source_dir.clone(),
            destination,
            schedule: Schedule::every(interval),
            command: config.command.clone(),
        })
    }

    /// The command line with placeholders substituted.
    pub fn command_line(&self) -> Vec<String> {
        let source = self.source.display().to_string();
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{source}", &source)
                    .replace("{destination}", &self.destination)
            })
            .collect()
    }
}
