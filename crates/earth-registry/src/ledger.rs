//! Installation ledger
//!
//! Enforces the installed-app invariants against the registry's records:
//!
//! - an `app_id` appears at most once per device; a second install is a
//!   `Conflict`, not a no-op
//! - the six protected apps can never be removed; protection is looked up
//!   in the allow-list at call time, ahead of any existence check

use std::sync::Arc;

use chrono::Utc;
use earth_core::validate::{
    check_app_id, check_device_id, is_protected_app, is_valid_app_version, PROTECTED_APPS,
};
use earth_core::{
    AppMetadata, EarthError, EarthResult, IdentityGenerator, InstalledApp, DEFAULT_APP_ICON,
};
use tracing::{info, warn};

use crate::locks::DeviceLocks;
use crate::store::{DeviceRecord, DeviceStore};

const MIB: u64 = 1024 * 1024;

/// Factory metadata for the protected apps: (app id, display name, size)
const FACTORY_APPS: [(&str, &str, u64); 6] = [
    ("camera", "Camera", 5 * MIB),
    ("appstore", "App Store", 10 * MIB),
    ("browser", "Browser", 8 * MIB),
    ("aichat", "AI Chat", 12 * MIB),
    ("settings", "Settings", 4 * MIB),
    ("files", "Files", 3 * MIB),
];

/// The protected apps every device is registered with
pub(crate) fn factory_apps() -> Vec<InstalledApp> {
    let now = Utc::now();
    FACTORY_APPS
        .iter()
        .map(|(app_id, name, size)| InstalledApp {
            app_id: app_id.to_string(),
            name: name.to_string(),
            version: "1.0.0".to_string(),
            icon: format!("{}.png", app_id),
            protected: is_protected_app(app_id),
            installed_at: now,
            size: *size,
            installation_id: IdentityGenerator::new_installation_id(),
        })
        .collect()
}

/// Per-device installed-app set operations
#[derive(Clone)]
pub struct InstallationLedger {
    store: Arc<dyn DeviceStore>,
    locks: Arc<DeviceLocks>,
}

impl InstallationLedger {
    pub(crate) fn new(store: Arc<dyn DeviceStore>, locks: Arc<DeviceLocks>) -> Self {
        debug_assert_eq!(FACTORY_APPS.len(), PROTECTED_APPS.len());
        Self { store, locks }
    }

    /// Install `app_id` on a device.
    ///
    /// The stored `protected` flag comes from the allow-list, never from
    /// the caller.
    pub async fn install(
        &self,
        device_id: &str,
        app_id: &str,
        metadata: AppMetadata,
    ) -> EarthResult<InstalledApp> {
        check_device_id(device_id)?;
        check_app_id(app_id)?;
        validate_metadata(&metadata)?;

        let _guard = self.locks.acquire(device_id).await;
        let mut record = self.load(device_id).await?;

        if record.apps.iter().any(|a| a.app_id == app_id) {
            return Err(EarthError::Conflict(format!(
                "App already installed: {}",
                app_id
            )));
        }

        let app = InstalledApp {
            app_id: app_id.to_string(),
            name: metadata.name.trim().to_string(),
            version: metadata.version,
            icon: metadata.icon.unwrap_or_else(|| DEFAULT_APP_ICON.to_string()),
            protected: is_protected_app(app_id),
            installed_at: Utc::now(),
            size: metadata.size.unwrap_or(0),
            installation_id: IdentityGenerator::new_installation_id(),
        };
        record.apps.push(app.clone());
        self.store.save(&record).await?;

        info!(
            device_id = %device_id,
            app_id = %app_id,
            version = %app.version,
            protected = app.protected,
            "App installed"
        );
        Ok(app)
    }

    /// Remove `app_id` from a device and return the removed record.
    ///
    /// Protected apps are refused with `Forbidden` whether or not the
    /// device or the app exists.
    pub async fn remove(&self, device_id: &str, app_id: &str) -> EarthResult<InstalledApp> {
        if is_protected_app(app_id) {
            warn!(device_id = %device_id, app_id = %app_id, "Refused removal of protected app");
            return Err(EarthError::Forbidden(format!(
                "Cannot remove protected app: {}",
                app_id
            )));
        }
        check_device_id(device_id)?;

        let _guard = self.locks.acquire(device_id).await;
        let mut record = self.load(device_id).await?;

        let index = record
            .apps
            .iter()
            .position(|a| a.app_id == app_id)
            .ok_or_else(|| EarthError::NotFound(format!("App not found: {}", app_id)))?;
        let removed = record.apps.remove(index);
        self.store.save(&record).await?;

        info!(device_id = %device_id, app_id = %app_id, "App removed");
        Ok(removed)
    }

    /// Installed apps in insertion order
    pub async fn list(&self, device_id: &str) -> EarthResult<Vec<InstalledApp>> {
        check_device_id(device_id)?;
        let _guard = self.locks.acquire(device_id).await;
        Ok(self.load(device_id).await?.apps)
    }

    pub async fn get(&self, device_id: &str, app_id: &str) -> EarthResult<InstalledApp> {
        self.list(device_id)
            .await?
            .into_iter()
            .find(|a| a.app_id == app_id)
            .ok_or_else(|| EarthError::NotFound(format!("App not found: {}", app_id)))
    }

    async fn load(&self, device_id: &str) -> EarthResult<DeviceRecord> {
        self.store
            .load(device_id)
            .await?
            .ok_or_else(|| EarthError::NotFound(format!("Device not found: {}", device_id)))
    }
}

fn validate_metadata(metadata: &AppMetadata) -> EarthResult<()> {
    if metadata.name.trim().is_empty() {
        return Err(EarthError::Validation("App name is required".to_string()));
    }
    if !is_valid_app_version(&metadata.version) {
        return Err(EarthError::Validation(format!(
            "Invalid app version: '{}'",
            metadata.version
        )));
    }
    Ok(())
}
