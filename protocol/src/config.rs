//! # Protocol Configuration & Constants
//!
//! Every magic number of the IOU ledger lives here. If you're hardcoding a
//! timeout somewhere else, move it here.
//!
//! Runtime settings (ports, party names, log format) are CLI arguments of
//! the node binary; their defaults are defined below so the binary, the
//! tests and the library agree on them.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Bumped when the transaction encoding or a contract rule changes.
pub const PROTOCOL_VERSION_MAJOR: u16 = 0;

/// Bumped for additions older nodes can ignore.
pub const PROTOCOL_VERSION_MINOR: u16 = 1;

pub const PROTOCOL_VERSION_PATCH: u16 = 0;

/// `MAJOR.MINOR.PATCH`, reported by the API and the `version` command.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Key and Hash Sizes
// ---------------------------------------------------------------------------

/// Signing key length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Public (verifying) key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length.
pub const SIGNATURE_LENGTH: usize = 64;

/// Transaction ids are SHA-256 digests of the canonical encoding.
pub const HASH_OUTPUT_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Session & Timing
// ---------------------------------------------------------------------------

/// How long a protocol instance waits at a suspension point for the
/// counterparty's next message before cancelling the whole transition.
pub const SESSION_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffered messages per session direction. Protocols exchange a handful
/// of messages, so a small buffer never blocks a well-behaved peer.
pub const SESSION_CHANNEL_CAPACITY: usize = 16;

/// Pending session initiations queued per node inbox.
pub const INBOX_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Transaction Limits
// ---------------------------------------------------------------------------

/// Maximum number of inputs per transaction. Keeps validation bounded.
pub const MAX_TX_INPUTS: usize = 256;

/// Maximum number of outputs per transaction.
pub const MAX_TX_OUTPUTS: usize = 256;

/// Issuer reference used by cash self-issuance.
pub const DEFAULT_ISSUER_REF: [u8; 1] = [0];

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 10050;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 10051;

/// Name of the notary identity on an in-process network.
pub const DEFAULT_NOTARY_NAME: &str = "Notary";

/// Default `RUST_LOG` filter when none is set in the environment.
pub const DEFAULT_LOG_FILTER: &str = "iou_node=info,iou_protocol=info,iou_contracts=info";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_matches_components() {
        let assembled = format!(
            "{}.{}.{}",
            PROTOCOL_VERSION_MAJOR, PROTOCOL_VERSION_MINOR, PROTOCOL_VERSION_PATCH
        );
        assert_eq!(assembled, PROTOCOL_VERSION);
    }

    #[test]
    fn test_crypto_parameter_sizes() {
        assert_eq!(SIGNING_KEY_LENGTH, 32);
        assert_eq!(VERIFYING_KEY_LENGTH, 32);
        assert_eq!(SIGNATURE_LENGTH, 64);
        assert_eq!(HASH_OUTPUT_LENGTH, 32);
    }

    #[test]
    fn test_ports_are_distinct() {
        assert_ne!(DEFAULT_API_PORT, DEFAULT_METRICS_PORT);
    }

    #[test]
    fn test_session_constants_sanity() {
        assert!(SESSION_RECEIVE_TIMEOUT.as_millis() > 0);
        assert!(SESSION_CHANNEL_CAPACITY > 0);
        assert!(INBOX_CAPACITY >= SESSION_CHANNEL_CAPACITY);
    }
}
