//! # IOU Ledger Contracts
//!
//! The rules every node applies, independently, to every transaction it
//! signs or records:
//!
//! - **IOU** — the lifecycle of an obligation: issue, transfer, settle.
//! - **Cash** — conservation and ownership of the money used to settle.
//!
//! ## Design Principles
//!
//! 1. Contracts are pure functions of a [`LedgerTransaction`]. No I/O, no
//!    clocks, no randomness. Two nodes looking at the same transaction must
//!    reach the same verdict.
//! 2. Every violated rule has its own error variant, and errors are never
//!    collapsed into a boolean. Whoever was refused deserves to know why.
//! 3. Structure first, values second, signatures last.
//! 4. All amount arithmetic is checked.

pub mod cash;
pub mod iou;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use iou_protocol::{ContractState, LedgerTransaction};

pub use cash::CashViolation;
pub use iou::IouViolation;

/// Broad category of a contract violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Wrong input/output cardinality or missing intent.
    Structural,
    /// An amount, currency or identity rule was broken.
    Value,
    /// The signer set is not what the rule requires.
    Authorization,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Structural => write!(f, "structural"),
            ViolationKind::Value => write!(f, "value"),
            ViolationKind::Authorization => write!(f, "authorization"),
        }
    }
}

/// A transaction failed contract verification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("IOU contract: {0}")]
    Iou(#[from] IouViolation),

    #[error("cash contract: {0}")]
    Cash(#[from] CashViolation),
}

impl ContractError {
    pub fn kind(&self) -> ViolationKind {
        match self {
            ContractError::Iou(v) => v.kind(),
            ContractError::Cash(v) => v.kind(),
        }
    }
}

/// Run every contract that governs a state or command in `tx`.
pub fn verify_transaction(tx: &LedgerTransaction) -> Result<(), ContractError> {
    let states = || tx.input_states().chain(tx.output_states());

    let touches_iou = states().any(|s| matches!(s, ContractState::Iou(_)))
        || !tx.iou_commands().is_empty();
    let touches_cash = states().any(|s| matches!(s, ContractState::Cash(_)))
        || !tx.cash_commands().is_empty();

    if touches_iou {
        iou::verify(tx)?;
    }
    if touches_cash {
        cash::verify(tx)?;
    }
    Ok(())
}
