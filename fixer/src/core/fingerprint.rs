//! Content addresses for cached command results.
//!
//! A fingerprint is the truncated SHA-256 of `"{rendered command}|{absolute cwd}"`.
//! It is pure: the same command and directory always map to the same entry.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::core::types::CommandSpec;

/// Number of digest bytes kept (16 hex characters).
pub const FINGERPRINT_BYTES: usize = 8;

/// Fingerprint a command spec.
pub fn fingerprint(spec: &CommandSpec) -> String {
    fingerprint_parts(&spec.rendered(), spec.cwd())
}

/// Fingerprint an already rendered command string and working directory.
pub fn fingerprint_parts(command: &str, cwd: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    hasher.update(b"|");
    hasher.update(cwd.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..FINGERPRINT_BYTES])
}

/// True if `value` has the shape of a fingerprint (lowercase hex, expected length).
pub fn is_fingerprint(value: &str) -> bool {
    value.len() == FINGERPRINT_BYTES * 2
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
