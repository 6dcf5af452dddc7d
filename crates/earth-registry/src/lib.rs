//! earth-registry - Device registry and installation ledger
//!
//! The registry is the source of truth for what is currently true about a
//! device: identity, configuration, committed OS version and installed
//! apps. Every mutation for a device runs inside that device's critical
//! section (see [`DeviceLocks`]); unrelated devices never wait on each
//! other.

pub mod error;
pub mod ledger;
pub mod locks;
pub mod registry;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use ledger::InstallationLedger;
pub use locks::{DeviceGuard, DeviceLocks};
pub use registry::DeviceRegistry;
pub use store::{DeviceRecord, DeviceStore, JsonFileStore, MemoryStore};
