use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced by the session state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum MotionError {
    #[error("Motion data not available: {0}")]
    NotAvailable(String),

    #[error("Motion permission denied: {0}")]
    PermissionDenied(String),

    #[error("Motion updates failed to start: {0}")]
    StartFailed(String),

    #[error("Motion update delivered no data: {0}")]
    NoData(String),

    #[error("Headset connection lost: {0}")]
    ConnectionLost(String),
}

impl MotionError {
    /// Whether the error feeds the automatic backoff restart.
    pub fn is_retryable(&self) -> bool {
        match self {
            MotionError::NotAvailable(_) | MotionError::StartFailed(_) | MotionError::NoData(_) => {
                true
            }
            MotionError::PermissionDenied(_) | MotionError::ConnectionLost(_) => false,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            MotionError::NotAvailable(m)
            | MotionError::PermissionDenied(m)
            | MotionError::StartFailed(m)
            | MotionError::NoData(m)
            | MotionError::ConnectionLost(m) => m,
        }
    }
}

pub type MotionResult<T> = Result<T, MotionError>;
