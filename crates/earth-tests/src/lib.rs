//! Integration tests for EarthOS device and update management
//!
//! The tests in `tests/` drive the registry, ledger and update session
//! manager together through [`TestBed`], which wires them over an
//! in-memory or on-disk store with in-memory collaborators:
//!
//! - [`PublishingCatalog`] - catalog that tests can publish packages to
//! - [`MemoryTransfer`] - payload bytes per URL, with failure injection
//! - [`RecordingInstaller`] - records every install it is asked to perform
//!
//! # Test Structure
//!
//! - `update_scenarios_test.rs` - session lifecycle, commit and rollback
//! - `ledger_test.rs` - installed-app invariants
//! - `concurrency_test.rs` - per-device serialization under parallel load

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use earth_core::{
    CatalogError, CatalogService, Device, InstallError, Installer, IntegrityChecker, OsVersion,
    PackageKind, UpdatePackage,
};
use earth_registry::{DeviceRegistry, DeviceStore, InstallationLedger, JsonFileStore, MemoryStore};
use earth_update::{MemoryTransfer, UpdateConfig, UpdateSessionManager};
use parking_lot::{Mutex, RwLock};

/// Catalog whose package list can grow while the system runs
#[derive(Default)]
pub struct PublishingCatalog {
    packages: RwLock<Vec<UpdatePackage>>,
}

impl PublishingCatalog {
    pub fn publish(&self, package: UpdatePackage) {
        self.packages.write().push(package);
    }
}

#[async_trait]
impl CatalogService for PublishingCatalog {
    async fn list_packages(&self) -> Result<Vec<UpdatePackage>, CatalogError> {
        Ok(self.packages.read().clone())
    }
}

/// Installer that accepts everything and remembers what it installed
#[derive(Default)]
pub struct RecordingInstaller {
    installed: Mutex<Vec<(String, OsVersion, String)>>,
}

impl RecordingInstaller {
    /// (device id, version, payload checksum) per install, in call order
    pub fn installs(&self) -> Vec<(String, OsVersion, String)> {
        self.installed.lock().clone()
    }
}

#[async_trait]
impl Installer for RecordingInstaller {
    async fn install(
        &self,
        device_id: &str,
        package: &UpdatePackage,
        payload: Bytes,
    ) -> Result<(), InstallError> {
        self.installed.lock().push((
            device_id.to_string(),
            package.version.clone(),
            IntegrityChecker::checksum(&payload),
        ));
        Ok(())
    }
}

/// Deterministic payload for a version
pub fn image(version: &str, size: usize) -> Vec<u8> {
    version.bytes().cycle().take(size).collect()
}

/// Package for `payload`, downloadable from `mem://<version>`
pub fn package_for(version: &str, payload: &[u8]) -> UpdatePackage {
    UpdatePackage {
        version: OsVersion::parse(version).expect("test version"),
        release_date: Utc::now(),
        changelog: format!("EarthOS {}", version),
        download_url: format!("mem://{}", version),
        checksum: IntegrityChecker::checksum(payload),
        size: payload.len() as u64,
        kind: PackageKind::Delta,
    }
}

/// Registry, ledger and manager wired over one store
pub struct TestBed {
    pub registry: DeviceRegistry,
    pub ledger: InstallationLedger,
    pub manager: UpdateSessionManager,
    pub catalog: Arc<PublishingCatalog>,
    pub transfer: MemoryTransfer,
    pub installer: Arc<RecordingInstaller>,
}

impl TestBed {
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), MemoryTransfer::new())
    }

    /// Bed whose transfer sleeps `delay` before each `chunk_size` chunk
    pub fn slow(chunk_size: usize, delay: Duration) -> Self {
        let transfer = MemoryTransfer::new()
            .with_chunk_size(chunk_size)
            .with_chunk_delay(delay);
        Self::with_store(Arc::new(MemoryStore::new()), transfer)
    }

    /// Bed persisting devices under `data_dir`
    pub async fn on_disk(data_dir: &Path) -> Self {
        let store = JsonFileStore::open(data_dir).await.expect("open store");
        Self::with_store(Arc::new(store), MemoryTransfer::new())
    }

    pub fn with_store(store: Arc<dyn DeviceStore>, transfer: MemoryTransfer) -> Self {
        let registry = DeviceRegistry::new(store);
        let catalog = Arc::new(PublishingCatalog::default());
        let installer = Arc::new(RecordingInstaller::default());
        let manager = UpdateSessionManager::new(
            registry.clone(),
            catalog.clone(),
            Arc::new(transfer.clone()),
            installer.clone(),
            UpdateConfig::default(),
        );
        Self {
            ledger: registry.ledger(),
            registry,
            manager,
            catalog,
            transfer,
            installer,
        }
    }

    /// Publish `version` with a generated image served at its URL
    pub fn publish(&self, version: &str) -> UpdatePackage {
        let payload = image(version, 4096);
        let package = package_for(version, &payload);
        self.transfer.insert(package.download_url.clone(), payload);
        self.catalog.publish(package.clone());
        package
    }

    pub async fn device(&self, device_id: &str) -> Device {
        self.registry.get(device_id).await.expect("device exists")
    }

    pub async fn version_of(&self, device_id: &str) -> OsVersion {
        self.device(device_id).await.os_version
    }
}
