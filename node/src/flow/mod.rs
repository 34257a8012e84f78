//! # Flows
//!
//! The multi-party protocols that move IOUs through their lifecycle.
//!
//! | Flow | Initiator | Counterparties |
//! |------|-----------|----------------|
//! | [`issue_iou`] | lender or borrower | the other party |
//! | [`transfer_iou`] | current lender | borrower, new lender |
//! | [`SettleFlow`] | borrower | lender |
//! | [`self_issue_cash`] | anyone | none |
//!
//! Every counterparty runs a [`Responder`]. Flows take a [`FlowContext`]
//! naming the node they run on; nothing is read from ambient state.

pub mod context;
pub mod error;
pub mod finality;
pub mod identity_sync;
pub mod issue;
pub mod message;
pub mod responder;
pub mod self_issue;
pub mod settle;
pub mod signatures;
pub mod transfer;

pub use context::FlowContext;
pub use error::FlowError;
pub use issue::issue_iou;
pub use message::{FlowKind, FlowMessage};
pub use responder::{Responder, ResponderStep};
pub use self_issue::self_issue_cash;
pub use settle::{SettleFlow, SettleStep};
pub use signatures::{AcceptAll, ProposalCheck};
pub use transfer::transfer_iou;
