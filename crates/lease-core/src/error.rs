//! Error types for descriptor and configuration handling.

use thiserror::Error;

/// Result type alias for provisioning-time operations.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

/// Errors surfaced to the operator at lease-creation time.
///
/// None of these are retried: the operator fixes the input and recreates
/// the lease.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("invalid descriptor: {0}")]
    Invalid(String),

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("invalid duration '{0}'")]
    Duration(String),

    #[error("configuration drift: created from {created}, now {current}; replace the lease")]
    Drift { created: String, current: String },

    #[error("i/o error on {path}: {reason}")]
    Io { path: String, reason: String },
}
