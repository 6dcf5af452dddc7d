//! In-memory device store for tests and ephemeral deployments

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{DeviceRecord, DeviceStore};
use crate::error::StoreResult;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, DeviceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn load(&self, device_id: &str) -> StoreResult<Option<DeviceRecord>> {
        Ok(self.records.read().get(device_id).cloned())
    }

    async fn save(&self, record: &DeviceRecord) -> StoreResult<()> {
        self.records
            .write()
            .insert(record.device_id().to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, device_id: &str) -> StoreResult<bool> {
        Ok(self.records.write().remove(device_id).is_some())
    }

    async fn list_ids(&self) -> StoreResult<Vec<String>> {
        let mut ids: Vec<String> = self.records.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
