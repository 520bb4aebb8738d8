//! Running step actions as child processes.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::step::StepAction;

/// Keep at most this many bytes of each output stream in step records.
const OUTPUT_TAIL_BYTES: usize = 4096;

/// Exit status and captured output of one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutput {
    /// `None` when the process could not be started or was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ActionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// An action that never produced an exit status.
    pub fn spawn_failure(reason: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: reason.into(),
        }
    }
}

/// Executes step actions. The orchestrator only sees exit status and output.
pub trait StepRunner: Send + Sync {
    fn run(&self, action: &StepAction) -> impl Future<Output = ActionOutput> + Send;
}

/// Runs actions on the host: shell actions through `sh -c`, exec actions
/// directly.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            working_dir: None,
            env: Vec::new(),
        }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command(&self, action: &StepAction) -> Command {
        let mut cmd = match action {
            StepAction::Shell { command } => {
                let mut cmd = Command::new(&self.shell);
                cmd.arg("-c").arg(command);
                cmd
            }
            StepAction::Exec { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        };
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl StepRunner for ShellRunner {
    async fn run(&self, action: &StepAction) -> ActionOutput {
        debug!(%action, "running action");
        match self.command(action).output().await {
            Ok(output) => ActionOutput {
                exit_code: output.status.code(),
                stdout: tail(&output.stdout),
                stderr: tail(&output.stderr),
            },
            Err(e) => ActionOutput::spawn_failure(format!("failed to start: {e}")),
        }
    }
}

/// Lossy UTF-8 of the last [`OUTPUT_TAIL_BYTES`] bytes.
fn tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(OUTPUT_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}
