//! The storage-sync action.

use std::future::Future;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::job::SyncJob;

/// Performs one copy of the save-state directory to durable storage.
pub trait Syncer: Send + Sync + 'static {
    fn sync(&self, job: &SyncJob) -> impl Future<Output = SyncResult<()>> + Send;
}

/// Runs the job's storage-sync command (by default `aws s3 sync`).
#[derive(Debug, Clone, Default)]
pub struct CommandSyncer;

impl Syncer for CommandSyncer {
    async fn sync(&self, job: &SyncJob) -> SyncResult<()> {
        if !tokio::fs::try_exists(&job.source).await.unwrap_or(false) {
            return Err(SyncError::SourceMissing(job.source.display().to_string()));
        }

        let argv = job.command_line();
        let Some((program, args)) = argv.split_first() else {
            return Err(SyncError::Spawn("empty sync command".to_string()));
        };
        debug!(%program, ?args, "running sync command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SyncError::Spawn(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(SyncError::CommandFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
