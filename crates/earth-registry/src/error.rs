//! Persistence errors

use earth_core::EarthError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`DeviceStore`](crate::DeviceStore) implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt device record {device_id}: {message}")]
    Corrupt { device_id: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for EarthError {
    fn from(err: StoreError) -> Self {
        EarthError::Internal(err.to_string())
    }
}
