//! Update session models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EarthError, ErrorKind};
use crate::version::OsVersion;

/// State of an update session.
///
/// # Lifecycle
///
/// ```text
/// Downloading ──► Verifying ──► Installing ──► Completed
///      │  │           │  │           │
///      │  └───────────┼──┴───────────┴──────► Failed
///      │              │
///      └──────────────┴─────────────────────► Cancelled
/// ```
///
/// # Cancel rules
///
/// - **Cancellable**: `Downloading`, `Verifying`
/// - **Not cancellable**: `Installing` (runs to `Completed` or `Failed`)
/// - `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Payload bytes are arriving. **Cancellable.**
    Downloading,
    /// Payload fully received, checksum being verified. **Cancellable.**
    Verifying,
    /// Verified payload is being applied. **Not cancellable.**
    Installing,
    /// Payload applied and version committed. Terminal.
    Completed,
    /// Download, verification or install failed. Terminal.
    Failed,
    /// Cancelled by the client before installation. Terminal.
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, SessionState::Downloading | SessionState::Verifying)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Downloading => "downloading",
            SessionState::Verifying => "verifying",
            SessionState::Installing => "installing",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloading" => Ok(SessionState::Downloading),
            "verifying" => Ok(SessionState::Verifying),
            "installing" => Ok(SessionState::Installing),
            "completed" => Ok(SessionState::Completed),
            "failed" => Ok(SessionState::Failed),
            "cancelled" => Ok(SessionState::Cancelled),
            _ => Err(format!("Unknown session state: '{}'", s)),
        }
    }
}

/// Forward update or rollback to a previously committed version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Update,
    Rollback,
}

/// Why a session ended in `Failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EarthError> for SessionFailure {
    fn from(err: &EarthError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Snapshot of one update attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSession {
    pub session_id: String,
    pub device_id: String,
    pub kind: SessionKind,
    /// Committed version when the session was created
    pub from_version: OsVersion,
    pub target_version: OsVersion,
    pub state: SessionState,
    /// Progress percentage (0.0 - 100.0) within the current phase
    pub progress: f64,
    /// Payload bytes received so far
    pub bytes_received: u64,
    /// Payload size published by the catalog
    pub bytes_total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UpdateSession {
    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }
}
