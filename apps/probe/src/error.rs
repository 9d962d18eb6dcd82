use thiserror::Error;

use crate::monitoring::types::FailureReason;

/// Errors raised while talking to the control plane.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Control plane request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Control plane returned {status} for {path}")]
    Status { path: String, status: u16 },

    #[error("Malformed control plane payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Control plane request failed after retries: {0}")]
    Retry(#[from] reqwest_middleware::Error),

    #[error("Invalid control plane URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors produced by a checker. Each variant maps to exactly one
/// [`FailureReason`] on the reported result.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Target unreachable: {0}")]
    Unreachable(String),

    #[error("{0}")]
    CriteriaNotMet(String),

    #[error("Invalid monitor configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal checker error: {0}")]
    Internal(String),
}

impl CheckError {
    pub fn reason(&self) -> FailureReason {
        match self {
            CheckError::Timeout(_) => FailureReason::Timeout,
            CheckError::Unreachable(_) => FailureReason::Unreachable,
            CheckError::CriteriaNotMet(_) => FailureReason::CriteriaNotMet,
            CheckError::InvalidConfig(_) => FailureReason::InvalidConfig,
            CheckError::Internal(_) => FailureReason::Internal,
        }
    }

    /// Classify a reqwest failure for a probe whose bound was `timeout_ms`.
    pub fn from_reqwest(error: reqwest::Error, timeout_ms: u64) -> Self {
        if error.is_timeout() {
            CheckError::Timeout(timeout_ms)
        } else if error.is_builder() {
            CheckError::InvalidConfig(error.to_string())
        } else {
            CheckError::Unreachable(error.to_string())
        }
    }
}
