//! Structural checks and input resolution.
//!
//! Turning a wire transaction into something a contract can verify takes two
//! steps: check that the transaction is well-formed (its id matches its
//! content, its size is within limits) and resolve every input reference to
//! the state it points at. Both are here. Signature checks live in
//! [`super::signing`].

use std::collections::HashMap;
use thiserror::Error;

use super::ledger::LedgerTransaction;
use super::signing::SignedTransaction;
use super::wire::WireTransaction;
use crate::config::{MAX_TX_INPUTS, MAX_TX_OUTPUTS};
use crate::crypto::SecureHash;
use crate::state::{StateAndRef, StateRef, TransactionState};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Structural transaction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// The stored id does not match the hash of the components.
    #[error("transaction id mismatch: expected {expected}, got {actual}")]
    IdMismatch {
        expected: SecureHash,
        actual: SecureHash,
    },

    /// The canonical encoding failed.
    #[error("transaction encoding failed: {0}")]
    Encoding(String),

    #[error("too many inputs: {count} (max {MAX_TX_INPUTS})")]
    TooManyInputs { count: usize },

    #[error("too many outputs: {count} (max {MAX_TX_OUTPUTS})")]
    TooManyOutputs { count: usize },

    /// The same state is consumed twice within one transaction.
    #[error("duplicate input {0}")]
    DuplicateInput(StateRef),

    /// A transaction with no commands authorises nothing.
    #[error("transaction has no commands")]
    NoCommands,
}

/// Input resolution failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// The producing transaction is not known to the resolver.
    #[error("unknown transaction {0} referenced by input")]
    UnknownTransaction(SecureHash),

    /// The producing transaction has no output at that index.
    #[error("input {0} points past the end of its transaction's outputs")]
    IndexOutOfRange(StateRef),
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Anything that can look up committed transactions by id.
pub trait StateResolver {
    fn resolve_transaction(&self, id: &SecureHash) -> Option<SignedTransaction>;

    /// Resolve one reference to its state.
    fn resolve_state(&self, reference: &StateRef) -> Result<TransactionState, ResolutionError> {
        let stx = self
            .resolve_transaction(&reference.txhash)
            .ok_or(ResolutionError::UnknownTransaction(reference.txhash))?;
        stx.tx
            .outputs
            .get(reference.index as usize)
            .cloned()
            .ok_or(ResolutionError::IndexOutOfRange(*reference))
    }
}

/// A slice of transactions resolves by linear search. Dependency lists are
/// short.
impl StateResolver for [SignedTransaction] {
    fn resolve_transaction(&self, id: &SecureHash) -> Option<SignedTransaction> {
        self.iter().find(|stx| stx.id() == *id).cloned()
    }
}

impl StateResolver for Vec<SignedTransaction> {
    fn resolve_transaction(&self, id: &SecureHash) -> Option<SignedTransaction> {
        self.as_slice().resolve_transaction(id)
    }
}

impl StateResolver for HashMap<SecureHash, SignedTransaction> {
    fn resolve_transaction(&self, id: &SecureHash) -> Option<SignedTransaction> {
        self.get(id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Structural checks on a wire transaction, cheapest first.
///
/// 1. Input and output counts within limits.
/// 2. At least one command.
/// 3. No input consumed twice.
/// 4. Id matches content.
pub fn verify_structure(wtx: &WireTransaction) -> Result<(), TransactionError> {
    if wtx.inputs.len() > MAX_TX_INPUTS {
        return Err(TransactionError::TooManyInputs {
            count: wtx.inputs.len(),
        });
    }
    if wtx.outputs.len() > MAX_TX_OUTPUTS {
        return Err(TransactionError::TooManyOutputs {
            count: wtx.outputs.len(),
        });
    }
    if wtx.commands.is_empty() {
        return Err(TransactionError::NoCommands);
    }
    let mut seen = std::collections::HashSet::with_capacity(wtx.inputs.len());
    for input in &wtx.inputs {
        if !seen.insert(input) {
            return Err(TransactionError::DuplicateInput(*input));
        }
    }
    wtx.check_id()
}

/// Resolve every input of `wtx` through `resolver`.
pub fn resolve<R: StateResolver + ?Sized>(
    wtx: &WireTransaction,
    resolver: &R,
) -> Result<LedgerTransaction, ResolutionError> {
    let inputs = wtx
        .inputs
        .iter()
        .map(|r| {
            resolver.resolve_state(r).map(|state| StateAndRef {
                state,
                reference: *r,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LedgerTransaction {
        id: wtx.id(),
        inputs,
        outputs: wtx.outputs.clone(),
        commands: wtx.commands.clone(),
        notary: wtx.notary.clone(),
    })
}
