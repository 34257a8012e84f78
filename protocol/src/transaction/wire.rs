//! The wire form of a transaction: inputs by reference, outputs and commands
//! in full.
//!
//! The id is the SHA-256 of the canonical bincode encoding of every component
//! (inputs, outputs, commands, notary, privacy salt). Signatures are not part
//! of the wire transaction, so the id is stable across signing and every
//! signer signs the same 32 bytes.
//!
//! The salt makes two otherwise-identical transactions (say, two identical
//! cash issuances) distinct.

use serde::{Deserialize, Serialize};

use super::verification::TransactionError;
use crate::crypto::{sha256, PublicKey, SecureHash};
use crate::identity::Party;
use crate::state::{StateAndRef, StateRef, TransactionState};
use crate::transaction::command::Command;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransaction {
    id: SecureHash,
    pub inputs: Vec<StateRef>,
    pub outputs: Vec<TransactionState>,
    pub commands: Vec<Command>,
    pub notary: Party,
    pub privacy_salt: [u8; 32],
}

/// Borrowed view of everything the id commits to.
#[derive(Serialize)]
struct IdComponents<'a> {
    inputs: &'a [StateRef],
    outputs: &'a [TransactionState],
    commands: &'a [Command],
    notary: &'a Party,
    privacy_salt: &'a [u8; 32],
}

impl WireTransaction {
    /// Assemble a wire transaction and compute its id.
    pub fn new(
        inputs: Vec<StateRef>,
        outputs: Vec<TransactionState>,
        commands: Vec<Command>,
        notary: Party,
        privacy_salt: [u8; 32],
    ) -> Result<Self, TransactionError> {
        let mut wtx = Self {
            id: SecureHash::ZERO,
            inputs,
            outputs,
            commands,
            notary,
            privacy_salt,
        };
        wtx.id = wtx.compute_id()?;
        Ok(wtx)
    }

    /// The id computed at construction time.
    pub fn id(&self) -> SecureHash {
        self.id
    }

    /// Recompute the id from the current component values.
    pub fn compute_id(&self) -> Result<SecureHash, TransactionError> {
        let components = IdComponents {
            inputs: &self.inputs,
            outputs: &self.outputs,
            commands: &self.commands,
            notary: &self.notary,
            privacy_salt: &self.privacy_salt,
        };
        let bytes =
            bincode::serialize(&components).map_err(|e| TransactionError::Encoding(e.to_string()))?;
        Ok(sha256(&bytes))
    }

    /// Fails if any component was changed after the id was computed, e.g. by
    /// a counterparty tampering with a proposal in flight.
    pub fn check_id(&self) -> Result<(), TransactionError> {
        let actual = self.compute_id()?;
        if actual == self.id {
            Ok(())
        } else {
            Err(TransactionError::IdMismatch {
                expected: self.id,
                actual,
            })
        }
    }

    /// Keys that must sign: every command signer, plus the notary when the
    /// transaction consumes anything.
    pub fn required_signing_keys(&self) -> std::collections::BTreeSet<PublicKey> {
        let mut keys: std::collections::BTreeSet<PublicKey> = self
            .commands
            .iter()
            .flat_map(|c| c.signers.iter().cloned())
            .collect();
        if !self.inputs.is_empty() {
            keys.insert(self.notary.owning_key.clone());
        }
        keys
    }

    /// Output `index` as a consumable reference.
    pub fn out_ref(&self, index: usize) -> Option<StateAndRef> {
        self.outputs.get(index).map(|state| StateAndRef {
            state: state.clone(),
            reference: StateRef::new(self.id, index as u32),
        })
    }

    /// Every output as a consumable reference.
    pub fn out_refs(&self) -> Vec<StateAndRef> {
        (0..self.outputs.len())
            .filter_map(|i| self.out_ref(i))
            .collect()
    }
}
