//! Completion marker — proof that this instance was bootstrapped, and from
//! which descriptor.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BootstrapError, BootstrapResult};
use crate::orchestrator::{BootstrapReport, StepRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMarker {
    /// Fingerprint of the lease descriptor the instance was created from.
    pub fingerprint: String,
    pub finished_at: u64,
    pub steps: Vec<StepRecord>,
}

impl CompletionMarker {
    pub fn from_report(fingerprint: &str, report: &BootstrapReport) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            finished_at: report.finished_at,
            steps: report.records.clone(),
        }
    }

    /// Read the marker, or `None` if this instance was never bootstrapped.
    pub fn load(path: &Path) -> BootstrapResult<Option<Self>> {
        read_json(path)
    }

    pub fn write(&self, path: &Path) -> BootstrapResult<()> {
        write_json(path, self)?;
        debug!(path = %path.display(), "completion marker written");
        Ok(())
    }

    /// Persist a (typically failed) report for postmortem diagnosis.
    pub fn write_report(path: &Path, report: &BootstrapReport) -> BootstrapResult<()> {
        write_json(path, report)
    }

    /// Read a report left by [`CompletionMarker::write_report`], if any.
    pub fn load_report(path: &Path) -> BootstrapResult<Option<BootstrapReport>> {
        read_json(path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> BootstrapResult<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(marker_err(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| marker_err(path, e))
}

/// Write through a temporary file so a crash never leaves half a marker.
fn write_json<T: Serialize>(path: &Path, value: &T) -> BootstrapResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| marker_err(path, e))?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| marker_err(path, e))?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).map_err(|e| marker_err(path, e))?;
    std::fs::rename(&tmp, path).map_err(|e| marker_err(path, e))
}

fn marker_err(path: &Path, e: impl std::fmt::Display) -> BootstrapError {
    BootstrapError::Marker {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}
