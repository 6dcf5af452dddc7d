//! Input syntax checks shared by the registry, ledger and update manager

use crate::error::{EarthError, EarthResult};
use crate::identity::DEVICE_ID_PREFIX;

/// Apps that ship with every device and can never be removed
pub const PROTECTED_APPS: [&str; 6] = ["camera", "appstore", "browser", "aichat", "settings", "files"];

const APP_ID_MIN_LEN: usize = 3;
const APP_ID_MAX_LEN: usize = 64;

/// Membership test against the fixed protected-app allow-list.
///
/// Protection is always derived from this list, never from stored or
/// caller-supplied flags.
pub fn is_protected_app(app_id: &str) -> bool {
    PROTECTED_APPS.contains(&app_id)
}

/// `earth-` followed by exactly 16 ASCII alphanumerics
pub fn is_valid_device_id(device_id: &str) -> bool {
    match device_id.strip_prefix(DEVICE_ID_PREFIX) {
        Some(rest) => rest.len() == 16 && rest.bytes().all(|b| b.is_ascii_alphanumeric()),
        None => false,
    }
}

/// Lowercase letters, digits and dashes, 3 to 64 characters
pub fn is_valid_app_id(app_id: &str) -> bool {
    (APP_ID_MIN_LEN..=APP_ID_MAX_LEN).contains(&app_id.len())
        && app_id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// App versions only need a leading `major.minor.patch`
pub fn is_valid_app_version(version: &str) -> bool {
    let mut parts = version.splitn(3, '.');
    let (Some(major), Some(minor), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let patch_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    is_number(major) && is_number(minor) && patch_len > 0
}

/// Exactly 64 hex characters (either case)
pub fn is_well_formed_checksum(checksum: &str) -> bool {
    checksum.len() == 64 && checksum.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn check_device_id(device_id: &str) -> EarthResult<()> {
    if is_valid_device_id(device_id) {
        Ok(())
    } else {
        Err(EarthError::Validation(format!(
            "Invalid device ID: '{}'",
            device_id
        )))
    }
}

pub fn check_app_id(app_id: &str) -> EarthResult<()> {
    if is_valid_app_id(app_id) {
        Ok(())
    } else {
        Err(EarthError::Validation(format!("Invalid app ID: '{}'", app_id)))
    }
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_list() {
        for app in PROTECTED_APPS {
            assert!(is_protected_app(app));
        }
        assert!(!is_protected_app("Camera"));
        assert!(!is_protected_app("notes"));
    }

    #[test]
    fn device_ids() {
        assert!(is_valid_device_id("earth-0123456789abcdef"));
        assert!(is_valid_device_id("earth-ABCDEF0123456789"));
        assert!(!is_valid_device_id("earth-0123456789abcde"));
        assert!(!is_valid_device_id("earth-0123456789abcdef0"));
        assert!(!is_valid_device_id("mars-0123456789abcdef"));
        assert!(!is_valid_device_id("earth-0123456789abcde!"));
    }

    #[test]
    fn app_ids() {
        assert!(is_valid_app_id("notes"));
        assert!(is_valid_app_id("weather-2"));
        assert!(!is_valid_app_id("ab"));
        assert!(!is_valid_app_id("Notes"));
        assert!(!is_valid_app_id("my_app"));
        assert!(!is_valid_app_id(&"a".repeat(65)));
    }

    #[test]
    fn app_versions() {
        assert!(is_valid_app_version("1.0.0"));
        assert!(is_valid_app_version("2.10.3-beta"));
        assert!(!is_valid_app_version("1.0"));
        assert!(!is_valid_app_version("one.two.three"));
        assert!(!is_valid_app_version("1..0"));
    }

    #[test]
    fn checksum_syntax() {
        assert!(is_well_formed_checksum(&"a".repeat(64)));
        assert!(is_well_formed_checksum(&"AB".repeat(32)));
        assert!(!is_well_formed_checksum(&"a".repeat(63)));
        assert!(!is_well_formed_checksum(&"g".repeat(64)));
    }
}
