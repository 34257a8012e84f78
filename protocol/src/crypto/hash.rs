//! # Hashing
//!
//! One hash function for the whole ledger: SHA-256. Transaction ids, state
//! references and certificate payloads are all SHA-256 digests wrapped in
//! [`SecureHash`] so a raw `[u8; 32]` can't be mistaken for a key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

use crate::config::HASH_OUTPUT_LENGTH;

/// Returned when parsing a hash from text fails.
#[derive(Debug, Error)]
#[error("invalid hash: expected {HASH_OUTPUT_LENGTH} hex-encoded bytes")]
pub struct InvalidHash;

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecureHash([u8; HASH_OUTPUT_LENGTH]);

/// Compute the SHA-256 hash of the input data.
pub fn sha256(data: &[u8]) -> SecureHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    SecureHash(hasher.finalize().into())
}

/// Hash several byte strings as one, each prefixed with its length so that
/// `["ab", "c"]` and `["a", "bc"]` never collide.
pub fn sha256_parts(parts: &[&[u8]]) -> SecureHash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    SecureHash(hasher.finalize().into())
}

impl SecureHash {
    /// The all-zero hash. Never the id of a real transaction.
    pub const ZERO: SecureHash = SecureHash([0u8; HASH_OUTPUT_LENGTH]);

    pub fn from_bytes(bytes: [u8; HASH_OUTPUT_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_OUTPUT_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, InvalidHash> {
        let bytes = hex::decode(s).map_err(|_| InvalidHash)?;
        let arr: [u8; HASH_OUTPUT_LENGTH] = bytes.as_slice().try_into().map_err(|_| InvalidHash)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureHash({}..)", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_deterministic() {
        assert_eq!(sha256(b"iou"), sha256(b"iou"));
        assert_ne!(sha256(b"iou"), sha256(b"IOU"));
    }

    #[test]
    fn test_parts_are_length_prefixed() {
        assert_ne!(sha256_parts(&[b"ab", b"c"]), sha256_parts(&[b"a", b"bc"]));
    }

    #[test]
    fn test_hex_roundtrip() {
        let h = sha256(b"settle");
        assert_eq!(SecureHash::from_hex(&h.to_hex()).unwrap(), h);
        assert!(SecureHash::from_hex("abcd").is_err());
    }
}
