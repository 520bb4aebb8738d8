//! Sync failures. All of them are transient from the daemon's point of view.

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync command failed (exit code {exit_code:?}): {stderr}")]
    CommandFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to start sync command: {0}")]
    Spawn(String),

    #[error("save-state directory {0} does not exist")]
    SourceMissing(String),

    #[error("sync daemon is not running")]
    Closed,

    #[error("control socket: {0}")]
    Control(String),
}
