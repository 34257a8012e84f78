//! Protocol messages exchanged over a flow session.
//!
//! Every message is JSON-encoded on the wire. A session carries messages of
//! one protocol only, and each side knows which message to expect next, so
//! anything else is a protocol violation.
//!
//! ```text
//! Initiator                                   Responder
//!   IdentityOffer { keys }             ->
//!                                      <-     IdentityRequest { keys }
//!   IdentityCertificates { certs }     ->
//!                                      <-     IdentityAck
//!   SignatureProposal { stx, deps }    ->
//!                                      <-     Signatures | Rejected
//!   Finalised { stx }                  ->
//!                                      <-     FinalityAck
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use iou_protocol::{IdentityCertificate, PublicKey, SecureHash, SignedTransaction};
use iou_protocol::transaction::TransactionSignature;

/// Which responder an incoming session should be handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowKind {
    Issue,
    Transfer,
    Settle,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::Issue => write!(f, "issue"),
            FlowKind::Transfer => write!(f, "transfer"),
            FlowKind::Settle => write!(f, "settle"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowMessage {
    /// Confidential keys in the transaction the sender can vouch for.
    IdentityOffer { keys: Vec<PublicKey> },
    /// The subset of offered keys the receiver cannot yet name.
    IdentityRequest { keys: Vec<PublicKey> },
    IdentityCertificates { certs: Vec<IdentityCertificate> },
    IdentityAck,

    /// A partially signed transaction plus the transactions that created
    /// its inputs.
    SignatureProposal {
        stx: SignedTransaction,
        dependencies: Vec<SignedTransaction>,
    },
    Signatures { sigs: Vec<TransactionSignature> },
    /// The receiver refuses to sign. `reason` is the verbatim cause.
    Rejected { reason: String },

    /// The notarised, fully signed transaction.
    Finalised { stx: SignedTransaction },
    FinalityAck { tx_id: SecureHash },
}

impl FlowMessage {
    /// Short name for logs and protocol errors.
    pub fn name(&self) -> &'static str {
        match self {
            FlowMessage::IdentityOffer { .. } => "IdentityOffer",
            FlowMessage::IdentityRequest { .. } => "IdentityRequest",
            FlowMessage::IdentityCertificates { .. } => "IdentityCertificates",
            FlowMessage::IdentityAck => "IdentityAck",
            FlowMessage::SignatureProposal { .. } => "SignatureProposal",
            FlowMessage::Signatures { .. } => "Signatures",
            FlowMessage::Rejected { .. } => "Rejected",
            FlowMessage::Finalised { .. } => "Finalised",
            FlowMessage::FinalityAck { .. } => "FinalityAck",
        }
    }
}
