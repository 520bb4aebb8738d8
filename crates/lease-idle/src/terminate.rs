//! Instance termination.

use std::future::Future;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::TerminateError;

/// Issues the (non-cancelable) instance-termination action.
pub trait Terminator: Send + Sync {
    fn terminate(&self) -> impl Future<Output = Result<(), TerminateError>> + Send;
}

/// Runs a shell command, `shutdown -h now` by default.
#[derive(Debug, Clone)]
pub struct CommandTerminator {
    command: String,
}

impl CommandTerminator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for CommandTerminator {
    fn default() -> Self {
        Self::new("shutdown -h now")
    }
}

impl Terminator for CommandTerminator {
    async fn terminate(&self) -> Result<(), TerminateError> {
        let output = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TerminateError::Spawn(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(TerminateError::Exit {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
