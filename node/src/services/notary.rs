//! # Notary
//!
//! The ordering and commit service. A notary sees every transaction that
//! consumes states it is responsible for and guarantees that each state is
//! consumed at most once.
//!
//! [`InMemoryNotary`] is non-validating: it checks signatures and uniqueness
//! of consumption, not contract rules. Commit is atomic. Either every input is
//! marked consumed by the transaction, or none is.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

use iou_protocol::{
    Keypair, Party, SecureHash, SignatureError, SignedTransaction, StateRef, TransactionSignature,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotaryError {
    /// An input was already consumed by another committed transaction.
    #[error("state {state} was already consumed by transaction {consumed_by}")]
    Conflict {
        state: StateRef,
        consumed_by: SecureHash,
    },

    #[error("transaction names notary {named}, not {actual}")]
    WrongNotary { named: String, actual: String },

    #[error(transparent)]
    Signatures(#[from] SignatureError),
}

/// Client side of the commit service.
#[async_trait]
pub trait NotaryClient: Send + Sync {
    fn identity(&self) -> &Party;

    /// Commit `stx`, returning the notary's signature over its id.
    async fn notarise(&self, stx: &SignedTransaction) -> Result<TransactionSignature, NotaryError>;
}

#[derive(Debug, Default)]
struct Committed {
    consumed: HashMap<StateRef, SecureHash>,
    signed: HashMap<SecureHash, TransactionSignature>,
}

pub struct InMemoryNotary {
    identity: Party,
    keypair: Keypair,
    committed: Mutex<Committed>,
}

impl InMemoryNotary {
    pub fn new(name: impl Into<String>) -> Self {
        let keypair = Keypair::generate();
        Self {
            identity: Party::new(name, keypair.public_key()),
            keypair,
            committed: Mutex::new(Committed::default()),
        }
    }

    /// Which transaction consumed `state`, if any.
    pub fn consumed_by(&self, state: &StateRef) -> Option<SecureHash> {
        self.committed.lock().consumed.get(state).copied()
    }

    pub fn committed_count(&self) -> usize {
        self.committed.lock().signed.len()
    }

    fn commit(&self, stx: &SignedTransaction) -> Result<TransactionSignature, NotaryError> {
        let tx_id = stx.id();
        let mut committed = self.committed.lock();

        if let Some(sig) = committed.signed.get(&tx_id) {
            return Ok(sig.clone());
        }
        for input in &stx.tx.inputs {
            if let Some(consumer) = committed.consumed.get(input) {
                return Err(NotaryError::Conflict {
                    state: *input,
                    consumed_by: *consumer,
                });
            }
        }
        for input in &stx.tx.inputs {
            committed.consumed.insert(*input, tx_id);
        }
        let sig = TransactionSignature::create(&tx_id, &self.keypair);
        committed.signed.insert(tx_id, sig.clone());
        Ok(sig)
    }
}

impl std::fmt::Debug for InMemoryNotary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryNotary")
            .field("identity", &self.identity)
            .field("committed", &self.committed_count())
            .finish()
    }
}

#[async_trait]
impl NotaryClient for InMemoryNotary {
    fn identity(&self) -> &Party {
        &self.identity
    }

    async fn notarise(&self, stx: &SignedTransaction) -> Result<TransactionSignature, NotaryError> {
        if stx.tx.notary.owning_key != self.identity.owning_key {
            return Err(NotaryError::WrongNotary {
                named: stx.tx.notary.name.clone(),
                actual: self.identity.name.clone(),
            });
        }
        stx.verify_signatures_except(std::slice::from_ref(&self.identity.owning_key))?;

        match self.commit(stx) {
            Ok(sig) => {
                tracing::info!(tx_id = %stx.id(), inputs = stx.tx.inputs.len(), "notarised");
                Ok(sig)
            }
            Err(e) => {
                tracing::warn!(tx_id = %stx.id(), error = %e, "notarisation refused");
                Err(e)
            }
        }
    }
}
