//! # Parties
//!
//! A ledger participant shows up in two costumes:
//!
//! - [`Party`] — a well-known identity: a legal name plus the key the
//!   network knows it by.
//! - [`AnonymousParty`] — a bare key. Cash change goes to fresh anonymous
//!   keys so observers can't link payments to the payer.
//!
//! Contracts only ever care about keys. Two parties are "the same party" when
//! their owning keys match, whichever costume they are wearing; see
//! [`AbstractParty`]'s `PartialEq`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::PublicKey;

/// A well-known identity on the network.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    /// Human-readable legal name, unique per network.
    pub name: String,
    /// The legal identity key.
    pub owning_key: PublicKey,
}

/// A confidential identity: just the key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnonymousParty {
    pub owning_key: PublicKey,
}

/// Either kind of party.
#[derive(Clone, Serialize, Deserialize)]
pub enum AbstractParty {
    WellKnown(Party),
    Anonymous(AnonymousParty),
}

impl Party {
    pub fn new(name: impl Into<String>, owning_key: PublicKey) -> Self {
        Self {
            name: name.into(),
            owning_key,
        }
    }

    /// Drop the name, keep the key.
    pub fn anonymise(&self) -> AnonymousParty {
        AnonymousParty {
            owning_key: self.owning_key.clone(),
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Party({}, {})", self.name, self.owning_key.short())
    }
}

impl AnonymousParty {
    pub fn new(owning_key: PublicKey) -> Self {
        Self { owning_key }
    }
}

impl fmt::Display for AnonymousParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Anonymous({})", self.owning_key.short())
    }
}

impl fmt::Debug for AnonymousParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl AbstractParty {
    pub fn owning_key(&self) -> &PublicKey {
        match self {
            AbstractParty::WellKnown(p) => &p.owning_key,
            AbstractParty::Anonymous(a) => &a.owning_key,
        }
    }

    /// The well-known party, if this one carries a name.
    pub fn as_well_known(&self) -> Option<&Party> {
        match self {
            AbstractParty::WellKnown(p) => Some(p),
            AbstractParty::Anonymous(_) => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, AbstractParty::Anonymous(_))
    }
}

// Equality by owning key: a well-known party and its anonymised self are the
// same participant as far as any contract is concerned.
impl PartialEq for AbstractParty {
    fn eq(&self, other: &Self) -> bool {
        self.owning_key() == other.owning_key()
    }
}

impl Eq for AbstractParty {}

impl std::hash::Hash for AbstractParty {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.owning_key().hash(state);
    }
}

impl PartialEq<Party> for AbstractParty {
    fn eq(&self, other: &Party) -> bool {
        *self.owning_key() == other.owning_key
    }
}

impl From<Party> for AbstractParty {
    fn from(p: Party) -> Self {
        AbstractParty::WellKnown(p)
    }
}

impl From<AnonymousParty> for AbstractParty {
    fn from(a: AnonymousParty) -> Self {
        AbstractParty::Anonymous(a)
    }
}

impl fmt::Display for AbstractParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractParty::WellKnown(p) => fmt::Display::fmt(p, f),
            AbstractParty::Anonymous(a) => fmt::Display::fmt(a, f),
        }
    }
}

impl fmt::Debug for AbstractParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractParty::WellKnown(p) => fmt::Debug::fmt(p, f),
            AbstractParty::Anonymous(a) => fmt::Debug::fmt(a, f),
        }
    }
}
