//! Update catalogs and version filtering

use std::path::PathBuf;

use async_trait::async_trait;
use earth_core::validate::is_well_formed_checksum;
use earth_core::{CatalogError, CatalogService, OsVersion, UpdatePackage};
use serde_json::Value;
use tracing::{debug, warn};

/// Packages strictly newer than `current`, ascending by precedence.
///
/// When the catalog lists a version more than once the first entry wins.
pub fn available_updates(packages: &[UpdatePackage], current: &OsVersion) -> Vec<UpdatePackage> {
    let mut newer: Vec<UpdatePackage> = Vec::new();
    for package in packages.iter().filter(|p| p.version > *current) {
        if !newer.iter().any(|p| p.version == package.version) {
            newer.push(package.clone());
        }
    }
    newer.sort_by(|a, b| a.version.cmp(&b.version));
    newer
}

/// First package published for exactly `version`
pub fn find_package<'a>(
    packages: &'a [UpdatePackage],
    version: &OsVersion,
) -> Option<&'a UpdatePackage> {
    packages.iter().find(|p| p.version == *version)
}

/// Fixed, in-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    packages: Vec<UpdatePackage>,
}

impl StaticCatalog {
    pub fn new(packages: Vec<UpdatePackage>) -> Self {
        Self { packages }
    }
}

#[async_trait]
impl CatalogService for StaticCatalog {
    async fn list_packages(&self) -> Result<Vec<UpdatePackage>, CatalogError> {
        Ok(self.packages.clone())
    }
}

/// Catalog backed by a JSON manifest (an array of packages), re-read on
/// every listing. Entries that fail to parse or carry a malformed checksum
/// are skipped with a warning.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogService for FileCatalog {
    async fn list_packages(&self) -> Result<Vec<UpdatePackage>, CatalogError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CatalogError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let entries: Vec<Value> = serde_json::from_str(&content)
            .map_err(|e| CatalogError::Invalid(format!("{}: {}", self.path.display(), e)))?;

        let mut packages = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<UpdatePackage>(entry) {
                Ok(package) if is_well_formed_checksum(&package.checksum) => packages.push(package),
                Ok(package) => {
                    warn!(index, version = %package.version, "Skipping catalog entry with malformed checksum")
                }
                Err(e) => warn!(index, error = %e, "Skipping unreadable catalog entry"),
            }
        }

        debug!(path = %self.path.display(), count = packages.len(), "Catalog loaded");
        Ok(packages)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use earth_core::PackageKind;
    use pretty_assertions::assert_eq;

    use super::*;

    fn package(version: &str, changelog: &str) -> UpdatePackage {
        UpdatePackage {
            version: OsVersion::parse(version).unwrap(),
            release_date: Utc::now(),
            changelog: changelog.to_string(),
            download_url: format!("{}.eosupdate", version),
            checksum: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".into(),
            size: 0,
            kind: PackageKind::Delta,
        }
    }

    fn versions(packages: &[UpdatePackage]) -> Vec<String> {
        packages.iter().map(|p| p.version.to_string()).collect()
    }

    #[test]
    fn filters_strictly_newer_and_sorts() {
        let packages = vec![
            package("1.1.0", ""),
            package("1.0.0", ""),
            package("1.10.0", ""),
            package("1.0.1", ""),
            package("1.2.0-beta", ""),
        ];
        let current = OsVersion::parse("1.0.0").unwrap();
        assert_eq!(
            versions(&available_updates(&packages, &current)),
            vec!["1.0.1", "1.1.0", "1.2.0-beta", "1.10.0"]
        );

        let latest = OsVersion::parse("1.10.0").unwrap();
        assert!(available_updates(&packages, &latest).is_empty());
    }

    #[test]
    fn duplicate_versions_keep_first() {
        let packages = vec![package("1.0.1", "first"), package("1.0.1", "second")];
        let newer = available_updates(&packages, &OsVersion::initial());
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].changelog, "first");
        assert_eq!(
            find_package(&packages, &OsVersion::new(1, 0, 1)).unwrap().changelog,
            "first"
        );
        assert!(find_package(&packages, &OsVersion::new(2, 0, 0)).is_none());
    }

    #[tokio::test]
    async fn file_catalog_skips_bad_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let good = serde_json::to_value(package("1.0.1", "ok")).unwrap();
        let mut bad_checksum = serde_json::to_value(package("1.0.2", "bad")).unwrap();
        bad_checksum["checksum"] = "abc123def456".into();
        let mut bad_version = serde_json::to_value(package("1.0.3", "bad")).unwrap();
        bad_version["version"] = "one".into();
        tokio::fs::write(
            &path,
            serde_json::to_string(&vec![good, bad_checksum, bad_version]).unwrap(),
        )
        .await
        .unwrap();

        let packages = FileCatalog::new(&path).list_packages().await.unwrap();
        assert_eq!(versions(&packages), vec!["1.0.1"]);
    }

    #[tokio::test]
    async fn file_catalog_missing_file_is_unavailable() {
        let err = FileCatalog::new("/nonexistent/catalog.json")
            .list_packages()
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Unavailable(_)));
    }
}
