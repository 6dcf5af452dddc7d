//! Update package models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::OsVersion;

/// Whether a package carries a full OS image or a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Full,
    Delta,
}

/// A published OS update. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePackage {
    pub version: OsVersion,
    pub release_date: DateTime<Utc>,
    #[serde(default)]
    pub changelog: String,
    pub download_url: String,
    /// SHA-256 of the payload, 64 lowercase hex characters
    pub checksum: String,
    /// Payload size in bytes
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: PackageKind,
}

/// Result of an update check for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCheck {
    pub device_id: String,
    pub current_version: OsVersion,
    /// Highest version known to the catalog, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<OsVersion>,
    pub is_update_available: bool,
    /// Packages strictly newer than `current_version`, ascending
    pub packages: Vec<UpdatePackage>,
}
