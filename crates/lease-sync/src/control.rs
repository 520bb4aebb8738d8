//! Control socket — lets a separate process request a sync and wait for it.
//!
//! Line protocol over a Unix stream socket:
//!
//! ```text
//! client → "sync\n"
//! daemon → "ok\n" | "failed <reason>\n"
//! ```

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::daemon::{SyncHandle, SyncTrigger};
use crate::error::{SyncError, SyncResult};

/// Serve sync requests on `path` until `shutdown` fires.
///
/// A stale socket file from a previous run is replaced.
pub async fn serve_control_socket(
    path: &Path,
    handle: SyncHandle,
    mut shutdown: watch::Receiver<bool>,
) -> SyncResult<()> {
    let control_err = |e: std::io::Error| SyncError::Control(format!("{}: {e}", path.display()));

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(control_err)?;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed stale control socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(control_err(e)),
    }

    let listener = UnixListener::bind(path).map_err(control_err)?;
    info!(path = %path.display(), "sync control socket listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handle).await {
                            warn!(error = %e, "control connection failed");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "control socket accept failed"),
            },
            _ = shutdown.changed() => break,
        }
    }

    let _ = tokio::fs::remove_file(path).await;
    Ok(())
}

async fn handle_connection(stream: UnixStream, handle: SyncHandle) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        let reply = match line.trim() {
            "sync" => match handle.request_sync().await {
                Ok(()) => "ok\n".to_string(),
                Err(e) => format!("failed {e}\n"),
            },
            other => format!("failed unknown command '{other}'\n"),
        };
        write.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}

/// Client side of the control socket.
#[derive(Debug, Clone)]
pub struct SocketTrigger {
    path: PathBuf,
}

impl SocketTrigger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SyncTrigger for SocketTrigger {
    async fn trigger_sync(&self) -> SyncResult<()> {
        let control_err =
            |e: std::io::Error| SyncError::Control(format!("{}: {e}", self.path.display()));

        let stream = UnixStream::connect(&self.path).await.map_err(control_err)?;
        let (read, mut write) = stream.into_split();
        write.write_all(b"sync\n").await.map_err(control_err)?;

        let mut lines = BufReader::new(read).lines();
        let reply = lines
            .next_line()
            .await
            .map_err(control_err)?
            .ok_or_else(|| SyncError::Control("daemon closed the connection".to_string()))?;

        match reply.trim() {
            "ok" => Ok(()),
            other => Err(SyncError::Control(
                other.strip_prefix("failed ").unwrap_or(other).to_string(),
            )),
        }
    }
}
