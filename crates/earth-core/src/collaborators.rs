//! Contracts for the external collaborators of the update pipeline
//!
//! - [`CatalogService`] supplies published update packages
//! - [`ObjectTransfer`] streams payload bytes for a package URL
//! - [`Installer`] applies a verified payload to a device
//!
//! The session manager only depends on these traits; concrete
//! implementations live in `earth-update` and in test fixtures.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use thiserror::Error;

use crate::error::EarthError;
use crate::models::UpdatePackage;

/// Lazy, finite stream of payload chunks. Dropping it releases the
/// underlying transfer.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransferError>> + Send>>;

#[derive(Debug, Error, Clone)]
pub enum TransferError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Unsupported URL: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error, Clone)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid catalog data: {0}")]
    Invalid(String),
}

#[derive(Debug, Error, Clone)]
pub enum InstallError {
    #[error("Install failed: {0}")]
    Failed(String),

    #[error("Payload rejected: {0}")]
    Rejected(String),
}

impl From<TransferError> for EarthError {
    fn from(err: TransferError) -> Self {
        EarthError::Transfer(err.to_string())
    }
}

impl From<CatalogError> for EarthError {
    fn from(err: CatalogError) -> Self {
        EarthError::Internal(err.to_string())
    }
}

impl From<InstallError> for EarthError {
    fn from(err: InstallError) -> Self {
        EarthError::Internal(err.to_string())
    }
}

/// Source of payload bytes for update packages
#[async_trait]
pub trait ObjectTransfer: Send + Sync {
    /// Open a byte stream for `url`. The stream is read incrementally and
    /// may be dropped early to cancel the transfer.
    async fn fetch(&self, url: &str) -> Result<ByteStream, TransferError>;
}

/// Read side of the update catalog
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// All published packages, in catalog order
    async fn list_packages(&self) -> Result<Vec<UpdatePackage>, CatalogError>;
}

/// Applies a verified payload to a device (replaces its OS image or
/// applies the delta). Only ever called with a checksum-verified payload.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(
        &self,
        device_id: &str,
        package: &UpdatePackage,
        payload: Bytes,
    ) -> Result<(), InstallError>;
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    struct Fixed(Vec<&'static [u8]>);

    #[async_trait]
    impl ObjectTransfer for Fixed {
        async fn fetch(&self, _url: &str) -> Result<ByteStream, TransferError> {
            let chunks: Vec<Result<Bytes, TransferError>> = self
                .0
                .iter()
                .map(|c| Ok(Bytes::from_static(*c)))
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[tokio::test]
    async fn transfer_trait_objects_stream_chunks() {
        let transfer: Box<dyn ObjectTransfer> = Box::new(Fixed(vec![&b"ab"[..], &b"cd"[..]]));
        let mut stream = transfer.fetch("mem://x").await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"abcd");
    }

    #[test]
    fn collaborator_errors_map_to_kinds() {
        let err: EarthError = TransferError::ConnectionFailed("reset".into()).into();
        assert_eq!(err.kind(), crate::ErrorKind::TransferFailed);
        let err: EarthError = CatalogError::Unavailable("down".into()).into();
        assert_eq!(err.kind(), crate::ErrorKind::InternalError);
    }
}
