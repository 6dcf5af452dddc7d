//! TOML configuration for the daemon
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! working daemon rooted at `./earth-data`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use earth_update::UpdateConfig;
use serde::Deserialize;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Where update packages are published
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// JSON array of update packages. Without one the catalog is empty.
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    /// Directory that package download URLs are resolved against
    #[serde(default = "default_packages_dir")]
    pub packages_dir: PathBuf,
}

fn default_packages_dir() -> PathBuf {
    PathBuf::from("packages")
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            manifest: None,
            packages_dir: default_packages_dir(),
        }
    }
}

/// Top-level daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Root for device documents (`devices/`) and staged images (`staging/`)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Seconds between automatic update sweeps; 0 disables them
    #[serde(default = "default_auto_update_interval")]
    pub auto_update_interval_secs: u64,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("earth-data")
}

fn default_auto_update_interval() -> u64 {
    3600
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_format: LogFormat::default(),
            auto_update_interval_secs: default_auto_update_interval(),
            update: UpdateConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("staging")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = DaemonConfig::parse("").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("earth-data"));
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.auto_update_interval_secs, 3600);
        assert_eq!(config.update.install_progress_start, 50.0);
        assert_eq!(config.update.retain_terminal_sessions, 32);
        assert!(config.catalog.manifest.is_none());
        assert_eq!(config.catalog.packages_dir, PathBuf::from("packages"));
    }

    #[test]
    fn parses_full_file() {
        let config = DaemonConfig::parse(
            r#"
            data_dir = "/var/lib/earthd"
            log_format = "json"
            auto_update_interval_secs = 0

            [update]
            retain_terminal_sessions = 8

            [catalog]
            manifest = "/srv/earthos/catalog.json"
            packages_dir = "/srv/earthos/packages"
            "#,
        )
        .unwrap();

        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.auto_update_interval_secs, 0);
        assert_eq!(config.update.retain_terminal_sessions, 8);
        assert_eq!(config.update.install_progress_start, 50.0);
        assert_eq!(
            config.catalog.manifest.as_deref(),
            Some(Path::new("/srv/earthos/catalog.json"))
        );
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/earthd"));
        assert_eq!(config.staging_dir(), PathBuf::from("/var/lib/earthd/staging"));
    }

    #[test]
    fn rejects_unknown_log_format() {
        assert!(DaemonConfig::parse(r#"log_format = "xml""#).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DaemonConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }
}
