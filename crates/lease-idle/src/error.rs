//! Sampling and termination errors.

use std::time::Duration;

use thiserror::Error;

/// The activity probe could not produce a reading. Never fatal.
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("failed to start probe: {0}")]
    Spawn(String),

    #[error("probe exited with code {exit_code:?}: {stderr}")]
    Exit {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("probe output '{0}' is not a session count")]
    Parse(String),

    #[error("probe did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum TerminateError {
    #[error("failed to start terminate command: {0}")]
    Spawn(String),

    #[error("terminate command exited with code {exit_code:?}: {stderr}")]
    Exit {
        exit_code: Option<i32>,
        stderr: String,
    },
}
