//! earth-update - Update session management for EarthOS devices
//!
//! [`UpdateSessionManager`] drives each update attempt through
//! `downloading → verifying → installing → completed`, delegating byte
//! transfer, catalog reads and the install step to the collaborator
//! traits from `earth-core`. The device's committed OS version changes
//! only when a session completes.
//!
//! This crate also ships the concrete collaborators used by the daemon and
//! by tests: static and file-backed catalogs, in-memory and file-backed
//! transfers, and a staging installer.

pub mod catalog;
pub mod config;
pub mod installer;
pub mod manager;
pub mod transfer;

pub use catalog::{FileCatalog, StaticCatalog};
pub use config::UpdateConfig;
pub use installer::StagingInstaller;
pub use manager::UpdateSessionManager;
pub use transfer::{FileTransfer, MemoryTransfer};
