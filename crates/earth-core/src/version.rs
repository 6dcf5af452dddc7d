//! OS version numbers
//!
//! Versions are semantic versions. Ordering follows semver precedence:
//! pre-release versions sort below their release, and build metadata is
//! ignored for both ordering and equality.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EarthError;

/// A validated semantic version
#[derive(Debug, Clone)]
pub struct OsVersion(semver::Version);

impl OsVersion {
    /// Parse and validate a version string
    pub fn parse(s: &str) -> Result<Self, EarthError> {
        semver::Version::parse(s.trim())
            .map(Self)
            .map_err(|e| EarthError::InvalidVersion(format!("'{}': {}", s, e)))
    }

    /// Build a plain release version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// The version every freshly registered device starts on
    pub fn initial() -> Self {
        Self::new(1, 0, 0)
    }

    fn precedence(&self) -> (u64, u64, u64, &semver::Prerelease) {
        (self.0.major, self.0.minor, self.0.patch, &self.0.pre)
    }
}

impl PartialEq for OsVersion {
    fn eq(&self, other: &Self) -> bool {
        self.precedence() == other.precedence()
    }
}

impl Eq for OsVersion {}

impl PartialOrd for OsVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OsVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence().cmp(&other.precedence())
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OsVersion {
    type Err = EarthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for OsVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OsVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
