//! Identifier generation
//!
//! Device identifiers are `earth-` followed by 16 lowercase hex characters
//! drawn from the operating system's CSPRNG. Session and installation
//! identifiers are random (v4) UUIDs.

use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

/// Prefix shared by every device identifier
pub const DEVICE_ID_PREFIX: &str = "earth-";

/// Number of random bytes behind a device identifier (16 hex chars)
const DEVICE_ID_RANDOM_BYTES: usize = 8;

/// Stateless generator for device, session and installation identifiers
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityGenerator;

impl IdentityGenerator {
    /// New device identifier, e.g. `earth-3f9a0c17d2b4e681`
    pub fn new_device_id() -> String {
        let mut buf = [0u8; DEVICE_ID_RANDOM_BYTES];
        OsRng.fill_bytes(&mut buf);
        format!("{}{}", DEVICE_ID_PREFIX, hex::encode(buf))
    }

    /// New opaque update session identifier
    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// New opaque app installation identifier
    pub fn new_installation_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn device_id_shape() {
        let id = IdentityGenerator::new_device_id();
        assert!(id.starts_with(DEVICE_ID_PREFIX));
        let suffix = &id[DEVICE_ID_PREFIX.len()..];
        assert_eq!(suffix.len(), 16);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert!(crate::validate::is_valid_device_id(&id));
    }

    #[test]
    fn ids_do_not_repeat() {
        let devices: HashSet<_> = (0..1000).map(|_| IdentityGenerator::new_device_id()).collect();
        assert_eq!(devices.len(), 1000);

        let a = IdentityGenerator::new_session_id();
        let b = IdentityGenerator::new_session_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
