//! Commands: the intent of a transaction plus the keys that authorise it.
//!
//! Each contract has its own closed set of intents. A command's signers are
//! exactly the keys that must sign the enclosing transaction on the
//! command's behalf; contracts compare them as a set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::crypto::PublicKey;

/// IOU lifecycle intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IouCommand {
    /// Create the first version of an IOU.
    Issue,
    /// Replace the lender.
    Transfer,
    /// Pay some or all of the outstanding amount in cash.
    Settle,
}

/// Cash intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CashCommand {
    /// Create new cash out of nothing. Only the issuer may do this.
    Issue,
    /// Reassign existing cash. Every input owner signs.
    Move,
}

/// Command payload, tagged by contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandData {
    Iou(IouCommand),
    Cash(CashCommand),
}

impl fmt::Display for IouCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue => write!(f, "Issue"),
            Self::Transfer => write!(f, "Transfer"),
            Self::Settle => write!(f, "Settle"),
        }
    }
}

impl fmt::Display for CashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue => write!(f, "Issue"),
            Self::Move => write!(f, "Move"),
        }
    }
}

impl fmt::Display for CommandData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iou(c) => write!(f, "IOU.{}", c),
            Self::Cash(c) => write!(f, "Cash.{}", c),
        }
    }
}

impl From<IouCommand> for CommandData {
    fn from(c: IouCommand) -> Self {
        CommandData::Iou(c)
    }
}

impl From<CashCommand> for CommandData {
    fn from(c: CashCommand) -> Self {
        CommandData::Cash(c)
    }
}

/// A command with its required signers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub value: CommandData,
    pub signers: Vec<PublicKey>,
}

impl Command {
    pub fn new(value: impl Into<CommandData>, signers: Vec<PublicKey>) -> Self {
        Self {
            value: value.into(),
            signers,
        }
    }

    /// Signers as a set. Duplicates collapse.
    pub fn signer_set(&self) -> BTreeSet<PublicKey> {
        self.signers.iter().cloned().collect()
    }
}
