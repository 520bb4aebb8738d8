//! leased.toml — configuration for the lifecycle daemons.
//!
//! Every field has a default so an absent file is a valid configuration.
//! Durations are kept as human strings in the file and resolved through
//! [`parse_duration`] by the accessors below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::duration::parse_duration;
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::schedule::Schedule;

/// Save-game directory written by the dedicated server.
pub const DEFAULT_SAVE_DIR: &str = "/home/ubuntu/.config/Epic/FactoryGame/Saved/SaveGames/server";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub idle: IdleConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local save-state directory.
    pub source_dir: PathBuf,
    /// Durable-storage URI. Empty means "take it from the lease descriptor".
    pub destination: String,
    pub interval: String,
    /// Program and arguments of the storage-sync command. `{source}` and
    /// `{destination}` are substituted before each run.
    pub command: Vec<String>,
    /// Unix socket on which the sync daemon accepts on-demand sync requests.
    pub control_socket: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from(DEFAULT_SAVE_DIR),
            destination: String::new(),
            interval: "5m".to_string(),
            command: vec![
                "/usr/local/bin/aws".to_string(),
                "s3".to_string(),
                "sync".to_string(),
                "{source}".to_string(),
                "{destination}".to_string(),
            ],
            control_socket: PathBuf::from("/run/leased/sync.sock"),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> ProvisioningResult<Duration> {
        parse_duration(&self.interval)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Shell command printing the number of active client sessions.
    pub probe_command: String,
    pub sample_interval: String,
    pub threshold: String,
    /// Upper bound on the final pre-shutdown sync wait.
    pub sync_wait_timeout: String,
    /// Shell command that terminates the instance.
    pub terminate_command: String,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            probe_command: "ss -Hun state established '( sport = :7777 )' | wc -l".to_string(),
            sample_interval: "1m".to_string(),
            threshold: "20m".to_string(),
            sync_wait_timeout: "2m".to_string(),
            terminate_command: "shutdown -h now".to_string(),
        }
    }
}

impl IdleConfig {
    pub fn sample_interval(&self) -> ProvisioningResult<Duration> {
        parse_duration(&self.sample_interval)
    }

    pub fn threshold(&self) -> ProvisioningResult<Duration> {
        parse_duration(&self.threshold)
    }

    pub fn sync_wait_timeout(&self) -> ProvisioningResult<Duration> {
        parse_duration(&self.sync_wait_timeout)
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> ProvisioningResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ProvisioningError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` if given, otherwise use the defaults.
    pub fn load(path: Option<&Path>) -> ProvisioningResult<Self> {
        match path {
            Some(p) => {
                let config = Self::from_file(p)?;
                debug!(path = %p.display(), "daemon config loaded");
                Ok(config)
            }
            None => {
                debug!("no daemon config given; using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_toml_str(content: &str) -> ProvisioningResult<Self> {
        let config: DaemonConfig =
            toml::from_str(content).map_err(|e| ProvisioningError::Parse {
                what: "daemon config".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ProvisioningResult<String> {
        toml::to_string_pretty(self).map_err(|e| ProvisioningError::Parse {
            what: "daemon config".to_string(),
            reason: e.to_string(),
        })
    }

    /// Check durations and the sampling/threshold relation.
    ///
    /// The idle threshold is only honoured to within one sampling period,
    /// so sampling must be at most half the threshold.
    pub fn validate(&self) -> ProvisioningResult<()> {
        let sync_interval = self.sync.interval()?;
        if sync_interval < Schedule::MIN_INTERVAL {
            return Err(ProvisioningError::Invalid(format!(
                "sync interval {} is shorter than {}s",
                self.sync.interval,
                Schedule::MIN_INTERVAL.as_secs()
            )));
        }
        if self.sync.command.is_empty() {
            return Err(ProvisioningError::Invalid(
                "sync command is empty".to_string(),
            ));
        }

        let sample = self.idle.sample_interval()?;
        let threshold = self.idle.threshold()?;
        self.idle.sync_wait_timeout()?;
        if sample.is_zero() {
            return Err(ProvisioningError::Invalid(
                "sample interval must be positive".to_string(),
            ));
        }
        if sample * 2 > threshold {
            return Err(ProvisioningError::Invalid(format!(
                "sample interval {} must be at most half the idle threshold {}",
                self.idle.sample_interval, self.idle.threshold
            )));
        }
        if self.idle.terminate_command.trim().is_empty() {
            return Err(ProvisioningError::Invalid(
                "terminate command is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DaemonConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sync.interval().unwrap(), Duration::from_secs(300));
        assert_eq!(config.idle.threshold().unwrap(), Duration::from_secs(1200));
        assert_eq!(config.idle.sample_interval().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = DaemonConfig::from_toml_str(
            r#"
[idle]
threshold = "30m"
"#,
        )
        .unwrap();
        assert_eq!(config.idle.threshold().unwrap(), Duration::from_secs(1800));
        assert_eq!(config.idle.sample_interval, "1m");
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn rejects_sampling_slower_than_half_threshold() {
        let err = DaemonConfig::from_toml_str(
            r#"
[idle]
sample_interval = "15m"
threshold = "20m"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProvisioningError::Invalid(_)));
    }

    #[test]
    fn rejects_sub_second_sync_interval() {
        for interval in ["0s", "500ms"] {
            let toml = format!("[sync]\ninterval = \"{interval}\"\n");
            let err = DaemonConfig::from_toml_str(&toml).unwrap_err();
            assert!(
                matches!(err, ProvisioningError::Invalid(ref m) if m.contains("shorter than 1s")),
                "{interval}: {err}"
            );
        }
        DaemonConfig::from_toml_str("[sync]\ninterval = \"1s\"\n").unwrap();
    }

    #[test]
    fn rejects_bad_duration() {
        let err = DaemonConfig::from_toml_str(
            r#"
[sync]
interval = "often"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProvisioningError::Duration(_)));
    }

    #[test]
    fn load_without_path_is_default() {
        assert_eq!(DaemonConfig::load(None).unwrap(), DaemonConfig::default());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leased.toml");
        std::fs::write(&path, "[sync]\ninterval = \"10m\"\n").unwrap();
        let config = DaemonConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sync.interval().unwrap(), Duration::from_secs(600));
    }
}
