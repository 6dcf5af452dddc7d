//! Staging installer
//!
//! Writes each verified payload to `<dir>/<device_id>/<version>.img`.
//! The image is written to a temporary file and renamed into place, so a
//! crash mid-write never leaves a truncated image under the final name.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use earth_core::validate::is_valid_device_id;
use earth_core::{InstallError, Installer, UpdatePackage};
use tracing::info;

#[derive(Debug, Clone)]
pub struct StagingInstaller {
    dir: PathBuf,
}

impl StagingInstaller {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where the image for `device_id` at `version` is staged
    pub fn image_path(&self, device_id: &str, version: &str) -> PathBuf {
        self.dir.join(device_id).join(format!("{}.img", version))
    }
}

#[async_trait]
impl Installer for StagingInstaller {
    async fn install(
        &self,
        device_id: &str,
        package: &UpdatePackage,
        payload: Bytes,
    ) -> Result<(), InstallError> {
        if !is_valid_device_id(device_id) {
            return Err(InstallError::Rejected(format!(
                "Invalid device id: {}",
                device_id
            )));
        }
        if payload.len() as u64 != package.size {
            return Err(InstallError::Rejected(format!(
                "Payload is {} bytes, package declares {}",
                payload.len(),
                package.size
            )));
        }

        let target = self.image_path(device_id, &package.version.to_string());
        let io_err = |e: std::io::Error| InstallError::Failed(format!("{}: {}", target.display(), e));

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = target.with_extension("img.tmp");
        tokio::fs::write(&tmp, &payload).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &target).await.map_err(io_err)?;

        info!(
            device_id = %device_id,
            version = %package.version,
            bytes = payload.len(),
            path = %target.display(),
            "OS image staged"
        );
        Ok(())
    }
}
