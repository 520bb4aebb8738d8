//! Activity probes.

use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::SamplingError;

/// Whether the workload currently has any client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    Active,
    Idle,
}

impl ActivitySignal {
    pub fn from_sessions(sessions: u32) -> Self {
        if sessions > 0 {
            ActivitySignal::Active
        } else {
            ActivitySignal::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ActivitySignal::Active)
    }
}

impl fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivitySignal::Active => f.write_str("active"),
            ActivitySignal::Idle => f.write_str("idle"),
        }
    }
}

/// Samples the workload's activity.
pub trait ActivityProbe: Send + Sync {
    fn sample(&self) -> impl Future<Output = Result<ActivitySignal, SamplingError>> + Send;
}

/// Runs a shell command that prints the number of active sessions.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: String,
}

impl CommandProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ActivityProbe for CommandProbe {
    async fn sample(&self) -> Result<ActivitySignal, SamplingError> {
        let output = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SamplingError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(SamplingError::Exit {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = stdout.trim();
        let sessions = text
            .parse::<u32>()
            .map_err(|_| SamplingError::Parse(text.to_string()))?;
        debug!(sessions, "activity probe");
        Ok(ActivitySignal::from_sessions(sessions))
    }
}

/// Sample within `timeout`, mapping every failure to `Active`.
///
/// This is the only way the daemon reads activity, so a broken probe can
/// never by itself start the idle timer.
pub async fn sample_fail_safe<P: ActivityProbe>(probe: &P, timeout: Duration) -> ActivitySignal {
    let result = match tokio::time::timeout(timeout, probe.sample()).await {
        Ok(result) => result,
        Err(_) => Err(SamplingError::Timeout(timeout)),
    };
    match result {
        Ok(signal) => signal,
        Err(e) => {
            warn!(error = %e, "activity sampling failed; treating as active");
            ActivitySignal::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hanging;

    impl ActivityProbe for Hanging {
        async fn sample(&self) -> Result<ActivitySignal, SamplingError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ActivitySignal::Idle)
        }
    }

    #[tokio::test]
    async fn zero_sessions_is_idle() {
        let probe = CommandProbe::new("echo 0");
        assert_eq!(probe.sample().await.unwrap(), ActivitySignal::Idle);
    }

    #[tokio::test]
    async fn some_sessions_is_active() {
        let probe = CommandProbe::new("printf '  3\\n'");
        assert_eq!(probe.sample().await.unwrap(), ActivitySignal::Active);
    }

    #[tokio::test]
    async fn garbage_output_is_parse_error() {
        let probe = CommandProbe::new("echo lots");
        assert!(matches!(probe.sample().await, Err(SamplingError::Parse(_))));
    }

    #[tokio::test]
    async fn failing_command_is_exit_error() {
        let probe = CommandProbe::new("echo 0; exit 2");
        assert!(matches!(
            probe.sample().await,
            Err(SamplingError::Exit { exit_code: Some(2), .. })
        ));
    }

    #[tokio::test]
    async fn fail_safe_maps_errors_to_active() {
        let probe = CommandProbe::new("exit 1");
        assert_eq!(
            sample_fail_safe(&probe, Duration::from_secs(5)).await,
            ActivitySignal::Active
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fail_safe_maps_timeout_to_active() {
        assert_eq!(
            sample_fail_safe(&Hanging, Duration::from_secs(60)).await,
            ActivitySignal::Active
        );
    }
}
