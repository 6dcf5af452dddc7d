//! Device models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::OsVersion;

/// UI theme of a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Neon,
    Light,
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(Theme::Dark),
            "neon" => Ok(Theme::Neon),
            "light" => Ok(Theme::Light),
            _ => Err(format!("Unknown theme: '{}'", s)),
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Theme::Dark => "dark",
            Theme::Neon => "neon",
            Theme::Light => "light",
        })
    }
}

/// A registered device and its configuration.
///
/// `device_id` never changes. `os_version` only changes through a
/// committed update session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub name: String,
    #[serde(default)]
    pub theme: Theme,
    pub os_version: OsVersion,
    pub build_number: String,
    pub auto_sync: bool,
    pub auto_update: bool,
    pub crash_reports: bool,
    /// Previously committed versions, oldest first (rollback targets)
    #[serde(default)]
    pub version_history: Vec<OsVersion>,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// A new device with factory configuration
    pub fn new(device_id: String, name: String) -> Self {
        Self {
            device_id,
            name,
            theme: Theme::Dark,
            os_version: OsVersion::initial(),
            build_number: "1".to_string(),
            auto_sync: true,
            auto_update: true,
            crash_reports: true,
            version_history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether `version` was committed on this device at some point
    pub fn has_run(&self, version: &OsVersion) -> bool {
        self.version_history.contains(version)
    }
}
