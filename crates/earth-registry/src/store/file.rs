//! JSON-file device store
//!
//! One pretty-printed JSON document per device under
//! `<data_dir>/devices/<device_id>.json`. Writes go to a temporary file
//! that is renamed over the previous document.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{DeviceRecord, DeviceStore};
use crate::error::{StoreError, StoreResult};

const DEVICES_DIR: &str = "devices";

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (creating if needed) the store rooted at `data_dir`
    pub async fn open(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = data_dir.as_ref().join(DEVICES_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Opened device store");
        Ok(Self { dir })
    }

    fn record_path(&self, device_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", device_id))
    }
}

#[async_trait]
impl DeviceStore for JsonFileStore {
    async fn load(&self, device_id: &str) -> StoreResult<Option<DeviceRecord>> {
        let path = self.record_path(device_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                device_id: device_id.to_string(),
                message: e.to_string(),
            })
    }

    async fn save(&self, record: &DeviceRecord) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let path = self.record_path(record.device_id());
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!(device_id = %record.device_id(), "Saved device record");
        Ok(())
    }

    async fn delete(&self, device_id: &str) -> StoreResult<bool> {
        match tokio::fs::remove_file(self.record_path(device_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ids(&self) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use earth_core::{Device, OsVersion};

    use super::*;

    fn record(id: &str) -> DeviceRecord {
        DeviceRecord {
            device: Device::new(id.to_string(), "Desk".to_string()),
            apps: vec![],
        }
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = "earth-0123456789abcdef";

        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            let mut rec = record(id);
            rec.device.os_version = OsVersion::new(1, 0, 1);
            store.save(&rec).await.unwrap();
        }

        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.device.os_version, OsVersion::new(1, 0, 1));
        assert_eq!(store.list_ids().await.unwrap(), vec![id.to_string()]);
    }

    #[tokio::test]
    async fn missing_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let id = "earth-fedcba9876543210";

        assert!(store.load(id).await.unwrap().is_none());
        assert!(!store.delete(id).await.unwrap());

        store.save(&record(id)).await.unwrap();
        assert!(store.delete(id).await.unwrap());
        assert!(store.load(id).await.unwrap().is_none());
        assert!(store.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let id = "earth-1111111111111111";
        tokio::fs::write(store.record_path(id), "{ not json").await.unwrap();

        let err = store.load(id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
