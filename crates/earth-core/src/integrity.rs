//! Payload integrity checks (SHA-256)

use sha2::{Digest, Sha256};

use crate::validate::is_well_formed_checksum;

/// Stateless SHA-256 checksum computation and verification
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityChecker;

impl IntegrityChecker {
    /// Lowercase hex SHA-256 of the full content
    pub fn checksum(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Whether `bytes` hash to `expected`.
    ///
    /// `expected` is compared case-insensitively. Malformed input (wrong
    /// length, non-hex characters) is a failed verification, never a panic.
    pub fn verify(bytes: &[u8], expected: &str) -> bool {
        Self::matches(&Self::checksum(bytes), expected)
    }

    /// Compare an already computed lowercase digest against `expected`
    pub fn matches(actual: &str, expected: &str) -> bool {
        is_well_formed_checksum(expected) && actual.eq_ignore_ascii_case(expected)
    }
}

/// Incremental digest fed chunk by chunk as a payload arrives
#[derive(Clone, Default)]
pub struct RunningChecksum {
    hasher: Sha256,
    bytes: u64,
}

impl RunningChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Bytes fed so far
    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// Lowercase hex digest of everything fed so far
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl std::fmt::Debug for RunningChecksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningChecksum")
            .field("bytes", &self.bytes)
            .finish()
    }
}
