//! Device registry
//!
//! Owns every [`Device`] record and its installed-app set. Other
//! components hold device ids, never records; the update manager writes
//! back only through [`DeviceRegistry::commit_version`].

use std::sync::Arc;

use earth_core::validate::check_device_id;
use earth_core::{Device, EarthError, EarthResult, IdentityGenerator, OsVersion, Theme};
use serde_json::Value;
use tracing::{debug, info};

use crate::ledger::{factory_apps, InstallationLedger};
use crate::locks::DeviceLocks;
use crate::store::{DeviceRecord, DeviceStore};

/// Attempts at drawing an unused device id before giving up
const MAX_ID_ATTEMPTS: usize = 8;

/// Durable per-device records behind per-device critical sections
#[derive(Clone)]
pub struct DeviceRegistry {
    store: Arc<dyn DeviceStore>,
    locks: Arc<DeviceLocks>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self {
            store,
            locks: Arc::new(DeviceLocks::new()),
        }
    }

    /// Ledger sharing this registry's store and critical sections
    pub fn ledger(&self) -> InstallationLedger {
        InstallationLedger::new(self.store.clone(), self.locks.clone())
    }

    /// Register a new device with factory configuration and the protected
    /// apps pre-installed.
    pub async fn register(&self, name: &str) -> EarthResult<Device> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EarthError::Validation("Invalid device name".to_string()));
        }

        for _ in 0..MAX_ID_ATTEMPTS {
            let device_id = IdentityGenerator::new_device_id();
            let _guard = self.locks.acquire(&device_id).await;

            if self.store.load(&device_id).await?.is_some() {
                debug!(device_id = %device_id, "Device id already taken, drawing another");
                continue;
            }

            let record = DeviceRecord {
                device: Device::new(device_id.clone(), name.to_string()),
                apps: factory_apps(),
            };
            self.store.save(&record).await?;

            info!(device_id = %device_id, name = %name, "Device registered");
            return Ok(record.device);
        }

        Err(EarthError::Internal(
            "Could not allocate an unused device id".to_string(),
        ))
    }

    pub async fn get(&self, device_id: &str) -> EarthResult<Device> {
        check_device_id(device_id)?;
        let _guard = self.locks.acquire(device_id).await;
        Ok(self.load(device_id).await?.device)
    }

    /// All registered devices, ordered by id
    pub async fn list(&self) -> EarthResult<Vec<Device>> {
        let mut devices = Vec::new();
        for device_id in self.store.list_ids().await? {
            let _guard = self.locks.acquire(&device_id).await;
            // Removed between listing and loading
            if let Some(record) = self.store.load(&device_id).await? {
                devices.push(record.device);
            }
        }
        Ok(devices)
    }

    /// Apply a partial configuration update.
    ///
    /// Recognized keys: `name`, `theme`, `auto_sync`, `auto_update`,
    /// `crash_reports`. Unknown keys, wrongly typed values and immutable
    /// fields (`device_id`, `os_version`, ...) are ignored.
    pub async fn update_config(&self, device_id: &str, patch: &Value) -> EarthResult<Device> {
        check_device_id(device_id)?;
        let _guard = self.locks.acquire(device_id).await;
        let mut record = self.load(device_id).await?;

        let applied = apply_config_patch(&mut record.device, patch);
        if !applied.is_empty() {
            self.store.save(&record).await?;
            info!(device_id = %device_id, fields = ?applied, "Device config updated");
        }
        Ok(record.device)
    }

    /// Overwrite the committed OS version.
    ///
    /// Used only by the update session manager's commit step.
    pub async fn set_version(&self, device_id: &str, version: &OsVersion) -> EarthResult<Device> {
        self.commit_version(device_id, version, |_| ()).await
    }

    /// Commit `version` and run `on_commit` before leaving the device's
    /// critical section, so nothing reading through the registry sees the
    /// new version before `on_commit` has run.
    pub async fn commit_version<F>(
        &self,
        device_id: &str,
        version: &OsVersion,
        on_commit: F,
    ) -> EarthResult<Device>
    where
        F: FnOnce(&Device) + Send,
    {
        check_device_id(device_id)?;
        let _guard = self.locks.acquire(device_id).await;
        let mut record = self.load(device_id).await?;

        let previous = std::mem::replace(&mut record.device.os_version, version.clone());
        if previous != *version {
            record.device.version_history.push(previous.clone());
        }
        self.store.save(&record).await?;
        on_commit(&record.device);

        info!(
            device_id = %device_id,
            from = %previous,
            to = %version,
            "OS version committed"
        );
        Ok(record.device)
    }

    /// Delete a device together with its installed-app set
    pub async fn remove(&self, device_id: &str) -> EarthResult<Device> {
        check_device_id(device_id)?;
        let guard = self.locks.acquire(device_id).await;
        let record = self.load(device_id).await?;
        self.store.delete(device_id).await?;
        drop(guard);

        info!(device_id = %device_id, "Device removed");
        Ok(record.device)
    }

    async fn load(&self, device_id: &str) -> EarthResult<DeviceRecord> {
        self.store
            .load(device_id)
            .await?
            .ok_or_else(|| EarthError::NotFound(format!("Device not found: {}", device_id)))
    }
}

/// Apply recognized, well-typed fields; returns the names applied
fn apply_config_patch(device: &mut Device, patch: &Value) -> Vec<&'static str> {
    let mut applied = Vec::new();
    let Some(fields) = patch.as_object() else {
        return applied;
    };

    if let Some(name) = fields.get("name").and_then(Value::as_str) {
        let name = name.trim();
        if !name.is_empty() {
            device.name = name.to_string();
            applied.push("name");
        }
    }
    if let Some(theme) = fields
        .get("theme")
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<Theme>().ok())
    {
        device.theme = theme;
        applied.push("theme");
    }

    let flags: [(&'static str, &mut bool); 3] = [
        ("auto_sync", &mut device.auto_sync),
        ("auto_update", &mut device.auto_update),
        ("crash_reports", &mut device.crash_reports),
    ];
    for (key, slot) in flags {
        if let Some(value) = fields.get(key).and_then(Value::as_bool) {
            *slot = value;
            applied.push(key);
        }
    }

    applied
}

#[cfg(test)]
mod tests {
    use earth_core::validate::{is_valid_device_id, PROTECTED_APPS};
    use earth_core::AppMetadata;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn register_uses_factory_defaults() {
        let registry = registry();
        let device = registry.register("Kitchen tablet").await.unwrap();

        assert!(is_valid_device_id(&device.device_id));
        assert_eq!(device.name, "Kitchen tablet");
        assert_eq!(device.theme, Theme::Dark);
        assert_eq!(device.os_version, OsVersion::new(1, 0, 0));
        assert!(device.auto_sync && device.auto_update && device.crash_reports);

        let apps = registry.ledger().list(&device.device_id).await.unwrap();
        let ids: Vec<&str> = apps.iter().map(|a| a.app_id.as_str()).collect();
        assert_eq!(ids, PROTECTED_APPS.to_vec());
        assert!(apps.iter().all(|a| a.protected));
    }

    #[tokio::test]
    async fn register_rejects_blank_name() {
        let err = registry().register("   ").await.unwrap_err();
        assert!(matches!(err, EarthError::Validation(_)));
    }

    #[tokio::test]
    async fn get_validates_and_reports_missing() {
        let registry = registry();
        assert!(matches!(
            registry.get("not-a-device").await.unwrap_err(),
            EarthError::Validation(_)
        ));
        assert!(matches!(
            registry.get("earth-0000000000000000").await.unwrap_err(),
            EarthError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn unknown_ids_leave_no_lock_entries() {
        let registry = registry();
        let ledger = registry.ledger();
        for i in 0..1000u64 {
            let id = format!("earth-{:016x}", i);
            assert!(registry.get(&id).await.is_err());
            assert!(ledger.list(&id).await.is_err());
            assert!(ledger
                .install(&id, "notes", AppMetadata::new("Notes", "1.0.0"))
                .await
                .is_err());
        }
        assert!(registry
            .update_config("earth-ffffffffffffffff", &json!({ "theme": "light" }))
            .await
            .is_err());
        assert!(registry.remove("earth-ffffffffffffffff").await.is_err());
        assert_eq!(registry.locks.len(), 0);

        // Known devices are not pinned either once idle
        let device = registry.register("Desk").await.unwrap();
        registry.get(&device.device_id).await.unwrap();
        assert!(registry.locks.is_empty());
    }

    #[tokio::test]
    async fn update_config_applies_only_valid_fields() {
        let registry = registry();
        let device = registry.register("Phone").await.unwrap();

        let updated = registry
            .update_config(
                &device.device_id,
                &json!({
                    "theme": "neon",
                    "auto_sync": false,
                    "crash_reports": "nope",
                    "os_version": "9.9.9",
                    "device_id": "earth-ffffffffffffffff",
                    "wallpaper": "sunset.png"
                }),
            )
            .await
            .unwrap();

        assert_eq!(updated.theme, Theme::Neon);
        assert!(!updated.auto_sync);
        assert!(updated.crash_reports);
        assert_eq!(updated.os_version, OsVersion::initial());
        assert_eq!(updated.device_id, device.device_id);

        let unchanged = registry
            .update_config(&device.device_id, &json!({ "theme": "purple", "name": "" }))
            .await
            .unwrap();
        assert_eq!(unchanged.theme, Theme::Neon);
        assert_eq!(unchanged.name, "Phone");

        let ignored = registry
            .update_config(&device.device_id, &json!(["theme", "light"]))
            .await
            .unwrap();
        assert_eq!(ignored, unchanged);
    }

    #[tokio::test]
    async fn set_version_records_history() {
        let registry = registry();
        let device = registry.register("Laptop").await.unwrap();

        let v101 = OsVersion::new(1, 0, 1);
        let updated = registry.set_version(&device.device_id, &v101).await.unwrap();
        assert_eq!(updated.os_version, v101);
        assert_eq!(updated.version_history, vec![OsVersion::initial()]);
        assert!(updated.has_run(&OsVersion::initial()));

        let fetched = registry.get(&device.device_id).await.unwrap();
        assert_eq!(fetched, updated);
    }

    #[tokio::test]
    async fn remove_deletes_device_and_apps() {
        let registry = registry();
        let device = registry.register("Old phone").await.unwrap();
        let keep = registry.register("New phone").await.unwrap();

        registry.remove(&device.device_id).await.unwrap();

        assert!(matches!(
            registry.get(&device.device_id).await.unwrap_err(),
            EarthError::NotFound(_)
        ));
        assert!(matches!(
            registry.ledger().list(&device.device_id).await.unwrap_err(),
            EarthError::NotFound(_)
        ));
        let remaining: Vec<String> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.device_id)
            .collect();
        assert_eq!(remaining, vec![keep.device_id]);
    }
}
