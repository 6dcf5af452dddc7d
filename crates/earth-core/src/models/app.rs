//! Installed application models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Icon used when an install request does not name one
pub const DEFAULT_APP_ICON: &str = "default.png";

/// An application installed on a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledApp {
    pub app_id: String,
    pub name: String,
    pub version: String,
    pub icon: String,
    /// Snapshot of allow-list membership at install time. Informational
    /// only: removal re-derives protection from the allow-list.
    pub protected: bool,
    pub installed_at: DateTime<Utc>,
    pub size: u64,
    #[serde(default)]
    pub installation_id: String,
}

/// Caller-supplied metadata for an install request.
///
/// Carries no protection flag. A `protected` key in an incoming document
/// is ignored on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl AppMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            icon: None,
            size: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}
