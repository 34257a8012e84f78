//! # Ledger States
//!
//! A state is an immutable fact on the ledger. Transactions consume states
//! and produce new ones; a state that has been consumed is history and can
//! never be consumed again.
//!
//! Two kinds of fact exist here:
//!
//! - [`IouState`] — an obligation from a borrower to a lender. Linear: every
//!   version of the same obligation shares a [`UniqueIdentifier`].
//! - [`CashState`] — a fungible claim on an issuer, used to pay IOUs off.
//!
//! [`ContractState`] is the closed union of the two. Wrapping a state with its
//! notary gives a [`TransactionState`]; pointing at where it was created
//! gives a [`StateAndRef`].

pub mod cash;
pub mod iou;

pub use cash::{CashGroupKey, CashState, PartyAndReference};
pub use iou::IouState;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

use crate::crypto::{PublicKey, SecureHash};
use crate::identity::Party;

// ---------------------------------------------------------------------------
// UniqueIdentifier
// ---------------------------------------------------------------------------

/// The `linearId` of a linear state. Stable across every version.
///
/// Equality and hashing use `id` only; `external_id` is a free-form label
/// for humans and external systems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueIdentifier {
    pub external_id: Option<String>,
    pub id: Uuid,
}

impl UniqueIdentifier {
    pub fn new() -> Self {
        Self {
            external_id: None,
            id: Uuid::new_v4(),
        }
    }

    pub fn with_external_id(external_id: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            id: Uuid::new_v4(),
        }
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self {
            external_id: None,
            id,
        }
    }
}

impl Default for UniqueIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for UniqueIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for UniqueIdentifier {}

impl Hash for UniqueIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for UniqueIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UniqueIdentifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for UniqueIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.external_id {
            Some(ext) => write!(f, "{}_{}", ext, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Parses the bare UUID form. External ids are not recoverable from text.
impl FromStr for UniqueIdentifier {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_uuid(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// ContractState
// ---------------------------------------------------------------------------

/// Every kind of state the ledger knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractState {
    Iou(IouState),
    Cash(CashState),
}

impl ContractState {
    /// Keys of the parties this state is relevant to.
    pub fn participants(&self) -> Vec<PublicKey> {
        match self {
            ContractState::Iou(iou) => iou.participants(),
            ContractState::Cash(cash) => cash.participants(),
        }
    }

    pub fn as_iou(&self) -> Option<&IouState> {
        match self {
            ContractState::Iou(iou) => Some(iou),
            ContractState::Cash(_) => None,
        }
    }

    pub fn as_cash(&self) -> Option<&CashState> {
        match self {
            ContractState::Cash(cash) => Some(cash),
            ContractState::Iou(_) => None,
        }
    }
}

impl From<IouState> for ContractState {
    fn from(s: IouState) -> Self {
        ContractState::Iou(s)
    }
}

impl From<CashState> for ContractState {
    fn from(s: CashState) -> Self {
        ContractState::Cash(s)
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Points at output `index` of the transaction with id `txhash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    pub txhash: SecureHash,
    pub index: u32,
}

impl StateRef {
    pub fn new(txhash: SecureHash, index: u32) -> Self {
        Self { txhash, index }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.txhash, self.index)
    }
}

/// A state together with the notary that orders its consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionState {
    pub data: ContractState,
    pub notary: Party,
}

impl TransactionState {
    pub fn new(data: impl Into<ContractState>, notary: Party) -> Self {
        Self {
            data: data.into(),
            notary,
        }
    }
}

/// A state plus where it came from. This is what the vault hands out and
/// what a transaction builder consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    pub state: TransactionState,
    pub reference: StateRef,
}

impl StateAndRef {
    pub fn iou(&self) -> Option<&IouState> {
        self.state.data.as_iou()
    }

    pub fn cash(&self) -> Option<&CashState> {
        self.state.data.as_cash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256;

    #[test]
    fn linear_id_equality_ignores_external_id() {
        let a = UniqueIdentifier::with_external_id("invoice-7");
        let mut b = a.clone();
        b.external_id = None;
        assert_eq!(a, b);
        assert_ne!(a, UniqueIdentifier::new());
    }

    #[test]
    fn linear_id_parses_from_uuid_text() {
        let id = UniqueIdentifier::new();
        let parsed: UniqueIdentifier = id.id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<UniqueIdentifier>().is_err());
    }

    #[test]
    fn linear_id_display_includes_external_id() {
        let id = UniqueIdentifier::with_external_id("ext");
        assert!(id.to_string().starts_with("ext_"));
    }

    #[test]
    fn state_refs_order_by_tx_then_index() {
        let tx = sha256(b"tx");
        assert!(StateRef::new(tx, 0) < StateRef::new(tx, 1));
    }
}
