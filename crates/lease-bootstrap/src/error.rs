//! Error types for the bootstrap orchestrator.

use lease_core::ProvisioningError;
use thiserror::Error;

pub type BootstrapResult<T> = Result<T, BootstrapError>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A step's action exited non-zero or could not be started.
    #[error("bootstrap failed at step {index} ({name}): {reason}")]
    StepFailed {
        index: usize,
        name: String,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("invalid bootstrap plan: {0}")]
    Plan(String),

    #[error("completion marker {path}: {reason}")]
    Marker { path: String, reason: String },

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}
