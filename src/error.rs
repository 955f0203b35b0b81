//! Error taxonomy for trace processing.
//!
//! Only whole-trace failures live here. A segment whose blended likelihood is
//! not finite is reported per point (see [`crate::PointOutcome::Skipped`]) and
//! never fails the trace.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum EngineError {
    /// The road snapping service failed, timed out, or returned nothing.
    #[error("road snapping failed: {0}")]
    SnapFailed(String),

    /// The referenced user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A segment or user write failed.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    /// Stable classification string handed to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::SnapFailed(_) => "snap_failed",
            EngineError::NotFound(_) => "not_found",
            EngineError::Storage(_) => "storage",
            EngineError::InvalidInput(_) => "invalid_input",
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
