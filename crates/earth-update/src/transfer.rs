//! Object transfer implementations
//!
//! - [`MemoryTransfer`] serves payloads registered in memory, with
//!   optional per-chunk latency and failure injection for testing
//! - [`FileTransfer`] streams payloads from a local packages directory

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use earth_core::{ByteStream, ObjectTransfer, TransferError};
use parking_lot::RwLock;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Default chunk size for streamed payloads
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    /// Fail with a connection error once this many bytes were served
    fail_after: Option<usize>,
}

/// In-memory transfer keyed by URL
#[derive(Debug, Clone)]
pub struct MemoryTransfer {
    objects: Arc<RwLock<HashMap<String, MemoryObject>>>,
    chunk_size: usize,
    chunk_delay: Option<Duration>,
}

impl Default for MemoryTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransfer {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sleep before every chunk (simulates a slow link)
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Serve `data` at `url`, replacing any previous object
    pub fn insert(&self, url: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.write().insert(
            url.into(),
            MemoryObject {
                data: data.into(),
                fail_after: None,
            },
        );
    }

    /// Serve `data` at `url` but drop the connection after `bytes` bytes
    pub fn insert_failing(&self, url: impl Into<String>, data: impl Into<Bytes>, bytes: usize) {
        self.objects.write().insert(
            url.into(),
            MemoryObject {
                data: data.into(),
                fail_after: Some(bytes),
            },
        );
    }

    pub fn remove(&self, url: &str) {
        self.objects.write().remove(url);
    }
}

#[async_trait]
impl ObjectTransfer for MemoryTransfer {
    async fn fetch(&self, url: &str) -> Result<ByteStream, TransferError> {
        let object = self
            .objects
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(url.to_string()))?;
        let chunk_size = self.chunk_size;
        let chunk_delay = self.chunk_delay;
        let url = url.to_string();

        Ok(Box::pin(async_stream::stream! {
            let mut offset = 0;
            while offset < object.data.len() {
                if let Some(delay) = chunk_delay {
                    tokio::time::sleep(delay).await;
                }
                if let Some(limit) = object.fail_after {
                    if offset >= limit {
                        yield Err(TransferError::ConnectionFailed(format!(
                            "connection reset after {} bytes of {}",
                            offset, url
                        )));
                        return;
                    }
                }
                let end = (offset + chunk_size).min(object.data.len());
                yield Ok(object.data.slice(offset..end));
                offset = end;
            }
        }))
    }
}

/// Streams payloads from files under a packages directory.
///
/// URLs are paths relative to the directory, optionally prefixed with
/// `file://`. Absolute paths and `..` components are refused.
#[derive(Debug, Clone)]
pub struct FileTransfer {
    root: PathBuf,
    chunk_size: usize,
}

impl FileTransfer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn resolve(&self, url: &str) -> Result<PathBuf, TransferError> {
        let relative = Path::new(url.strip_prefix("file://").unwrap_or(url));
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !plain || relative.as_os_str().is_empty() {
            return Err(TransferError::Unsupported(url.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectTransfer for FileTransfer {
    async fn fetch(&self, url: &str) -> Result<ByteStream, TransferError> {
        let path = self.resolve(url)?;
        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TransferError::NotFound(url.to_string())
            } else {
                TransferError::ConnectionFailed(format!("{}: {}", path.display(), e))
            }
        })?;
        debug!(path = %path.display(), "Streaming package from file");

        let chunk_size = self.chunk_size;
        Ok(Box::pin(async_stream::try_stream! {
            let mut buf = vec![0u8; chunk_size];
            loop {
                let n = file
                    .read(&mut buf)
                    .await
                    .map_err(|e| TransferError::ReadFailed(e.to_string()))?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    async fn drain(mut stream: ByteStream) -> (Vec<u8>, usize, Option<TransferError>) {
        let mut data = Vec::new();
        let mut chunks = 0;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    chunks += 1;
                    data.extend_from_slice(&chunk);
                }
                Err(e) => return (data, chunks, Some(e)),
            }
        }
        (data, chunks, None)
    }

    #[tokio::test]
    async fn memory_transfer_chunks_payload() {
        let transfer = MemoryTransfer::new().with_chunk_size(4);
        transfer.insert("mem://pkg", vec![7u8; 10]);

        let (data, chunks, err) = drain(transfer.fetch("mem://pkg").await.unwrap()).await;
        assert_eq!(data, vec![7u8; 10]);
        assert_eq!(chunks, 3);
        assert!(err.is_none());

        assert!(matches!(
            transfer.fetch("mem://missing").await,
            Err(TransferError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn memory_transfer_failure_injection() {
        let transfer = MemoryTransfer::new().with_chunk_size(4);
        transfer.insert_failing("mem://flaky", vec![1u8; 16], 8);

        let (data, _, err) = drain(transfer.fetch("mem://flaky").await.unwrap()).await;
        assert_eq!(data.len(), 8);
        assert!(matches!(err, Some(TransferError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn file_transfer_reads_relative_paths_only() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("1.0.1.eosupdate"), b"payload-bytes")
            .await
            .unwrap();
        let transfer = FileTransfer::new(dir.path()).with_chunk_size(5);

        for url in ["1.0.1.eosupdate", "file://1.0.1.eosupdate"] {
            let (data, chunks, err) = drain(transfer.fetch(url).await.unwrap()).await;
            assert_eq!(data, b"payload-bytes");
            assert_eq!(chunks, 3);
            assert!(err.is_none());
        }

        for url in ["../secret", "/etc/passwd", ""] {
            assert!(matches!(
                transfer.fetch(url).await,
                Err(TransferError::Unsupported(_))
            ));
        }
        assert!(matches!(
            transfer.fetch("2.0.0.eosupdate").await,
            Err(TransferError::NotFound(_))
        ));
    }
}
