//! Cash: a fungible claim of `amount` on `issuer`, held by `owner`.
//!
//! Cash is only fungible within a group of the same currency and the same
//! issuer (party and reference). The cash contract checks conservation per
//! group.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::PublicKey;
use crate::identity::{AbstractParty, Party};
use crate::transaction::types::{Amount, Currency};

/// An issuer plus an opaque reference distinguishing its issuances.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyAndReference {
    pub party: Party,
    pub reference: Vec<u8>,
}

impl PartyAndReference {
    pub fn new(party: Party, reference: impl Into<Vec<u8>>) -> Self {
        Self {
            party,
            reference: reference.into(),
        }
    }
}

impl fmt::Debug for PartyAndReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.party, hex::encode(&self.reference))
    }
}

/// Fungibility key: cash with equal keys can be merged and split freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CashGroupKey {
    pub currency: Currency,
    pub issuer_key: PublicKey,
    pub issuer_ref: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashState {
    pub amount: Amount,
    pub owner: AbstractParty,
    pub issuer: PartyAndReference,
}

impl CashState {
    pub fn new(amount: Amount, owner: impl Into<AbstractParty>, issuer: PartyAndReference) -> Self {
        Self {
            amount,
            owner: owner.into(),
            issuer,
        }
    }

    pub fn group_key(&self) -> CashGroupKey {
        CashGroupKey {
            currency: self.amount.currency.clone(),
            issuer_key: self.issuer.party.owning_key.clone(),
            issuer_ref: self.issuer.reference.clone(),
        }
    }

    /// Same cash, new owner.
    pub fn with_new_owner(&self, owner: impl Into<AbstractParty>) -> CashState {
        CashState {
            owner: owner.into(),
            ..self.clone()
        }
    }

    pub fn participants(&self) -> Vec<PublicKey> {
        vec![self.owner.owning_key().clone()]
    }
}
