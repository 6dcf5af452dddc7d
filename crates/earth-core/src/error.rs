//! Common error types for device and update management

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for EarthOS core operations
pub type EarthResult<T> = Result<T, EarthError>;

/// Errors reported to callers of the registry, ledger and session manager.
///
/// Every variant maps to a stable [`ErrorKind`] tag; nothing in the core
/// swallows one of these silently.
#[derive(Debug, Clone, Error)]
pub enum EarthError {
    /// Malformed input (device id, app id, checksum syntax, metadata)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Version string fails semver syntax or ordering requirements
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// Duplicate install or duplicate active session
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation may never succeed (protected app removal)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown device, app, package or session
    #[error("Not found: {0}")]
    NotFound(String),

    /// Payload digest does not match the published checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Object transfer failed while downloading a payload
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Storage unavailable or another internal fault
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable tag attached to every reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    InvalidVersion,
    Conflict,
    Forbidden,
    NotFound,
    ChecksumMismatch,
    TransferFailed,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::InvalidVersion => "invalid_version",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ChecksumMismatch => "checksum_mismatch",
            ErrorKind::TransferFailed => "transfer_failed",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EarthError {
    /// Returns the stable kind tag for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EarthError::Validation(_) => ErrorKind::ValidationError,
            EarthError::InvalidVersion(_) => ErrorKind::InvalidVersion,
            EarthError::Conflict(_) => ErrorKind::Conflict,
            EarthError::Forbidden(_) => ErrorKind::Forbidden,
            EarthError::NotFound(_) => ErrorKind::NotFound,
            EarthError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            EarthError::Transfer(_) => ErrorKind::TransferFailed,
            EarthError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Returns the HTTP status code an outer transport should use
    pub fn status_code(&self) -> u16 {
        match self {
            EarthError::Validation(_) => 400,
            EarthError::InvalidVersion(_) => 400,
            EarthError::Conflict(_) => 409,
            EarthError::Forbidden(_) => 403,
            EarthError::NotFound(_) => 404,
            EarthError::ChecksumMismatch { .. } => 422,
            EarthError::Transfer(_) => 502,
            EarthError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        let err = EarthError::ChecksumMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
        assert_eq!(err.kind().as_str(), "checksum_mismatch");
        assert_eq!(
            serde_json::to_string(&ErrorKind::InternalError).unwrap(),
            "\"internal_error\""
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(EarthError::Forbidden("camera".into()).status_code(), 403);
        assert_eq!(EarthError::Conflict("dup".into()).status_code(), 409);
        assert_eq!(EarthError::NotFound("x".into()).status_code(), 404);
        assert_eq!(EarthError::InvalidVersion("1.x".into()).status_code(), 400);
        assert_eq!(EarthError::Internal("disk".into()).status_code(), 500);
    }
}
