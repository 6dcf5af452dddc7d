//! Device persistence
//!
//! A device and its installed-app set are stored together as one
//! [`DeviceRecord`] keyed by device id, so deleting a device deletes its
//! apps with it.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use earth_core::{Device, InstalledApp};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Everything persisted for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device: Device,
    /// Installed apps in insertion order
    #[serde(default)]
    pub apps: Vec<InstalledApp>,
}

impl DeviceRecord {
    pub fn device_id(&self) -> &str {
        &self.device.device_id
    }
}

/// Durable key-value storage for device records.
///
/// Callers serialize access per device; implementations only need to make
/// individual `save` calls atomic.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Load a record, `None` if the device is unknown
    async fn load(&self, device_id: &str) -> StoreResult<Option<DeviceRecord>>;

    /// Insert or replace a record
    async fn save(&self, record: &DeviceRecord) -> StoreResult<()>;

    /// Delete a record; returns whether it existed
    async fn delete(&self, device_id: &str) -> StoreResult<bool>;

    /// Ids of all stored devices, sorted
    async fn list_ids(&self) -> StoreResult<Vec<String>>;
}
