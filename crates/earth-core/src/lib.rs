//! earth-core - Core types for EarthOS device and update management
//!
//! This crate holds the pieces every other EarthOS crate agrees on: the
//! device/app/package/session models, the error taxonomy, identifier
//! generation, payload integrity checks, and the traits for the external
//! collaborators (catalog, object transfer, installer) that the update
//! pipeline consumes.

pub mod collaborators;
pub mod error;
pub mod identity;
pub mod integrity;
pub mod models;
pub mod validate;
pub mod version;

pub use collaborators::{
    ByteStream, CatalogError, CatalogService, InstallError, Installer, ObjectTransfer,
    TransferError,
};
pub use error::{EarthError, EarthResult, ErrorKind};
pub use identity::IdentityGenerator;
pub use integrity::{IntegrityChecker, RunningChecksum};
pub use models::*;
pub use version::OsVersion;
