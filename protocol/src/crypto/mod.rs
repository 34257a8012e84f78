//! # Cryptographic Primitives
//!
//! Ed25519 for signatures, SHA-256 for hashing. Both are thin, type-safe
//! wrappers around audited implementations. We don't roll our own crypto;
//! if you're tempted to optimize these functions, don't.

pub mod hash;
pub mod keys;

pub use hash::{sha256, sha256_parts, InvalidHash, SecureHash};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
