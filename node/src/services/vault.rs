//! # Vault
//!
//! A node's view of the ledger: every transaction it has recorded, and the
//! unconsumed states relevant to it.
//!
//! A state is relevant when the node holds one of its participant keys:
//! IOUs where it is lender or borrower, cash owned by its legal key or one of
//! its confidential keys.
//!
//! All locking is internal and scoped to a single call. Protocols never hold
//! a vault lock while they wait on a session.
//!
//! ## Soft locks
//!
//! Spend selection reserves the cash it picks under a lock id (one per
//! protocol instance). Reserved cash is invisible to other selections until
//! the owner releases it or the transaction consuming it is recorded.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use iou_protocol::{
    Amount, AmountError, ContractState, Currency, SecureHash, SignedTransaction,
    StateAndRef, StateRef, StateResolver, TransactionState, UniqueIdentifier,
};

use super::keys::KeyManagementService;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("insufficient spendable cash: requested {requested}, available {available}")]
    Insufficient { requested: Amount, available: Amount },

    #[error(transparent)]
    Arithmetic(#[from] AmountError),
}

#[derive(Debug, Default)]
struct VaultInner {
    transactions: HashMap<SecureHash, SignedTransaction>,
    unconsumed: BTreeMap<StateRef, TransactionState>,
    consumed: HashSet<StateRef>,
    soft_locks: HashMap<StateRef, Uuid>,
}

#[derive(Debug)]
pub struct Vault {
    keys: Arc<KeyManagementService>,
    inner: RwLock<VaultInner>,
}

impl Vault {
    pub fn new(keys: Arc<KeyManagementService>) -> Self {
        Self {
            keys,
            inner: RwLock::new(VaultInner::default()),
        }
    }

    fn is_relevant(&self, state: &ContractState) -> bool {
        state.participants().iter().any(|k| self.keys.owns(k))
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Record a committed transaction: consume its inputs, track its
    /// relevant outputs. Returns `false` if it was already recorded.
    pub fn record_transaction(&self, stx: &SignedTransaction) -> bool {
        let tx_id = stx.id();
        let mut inner = self.inner.write();
        if inner.transactions.contains_key(&tx_id) {
            return false;
        }

        for input in &stx.tx.inputs {
            inner.unconsumed.remove(input);
            inner.soft_locks.remove(input);
            inner.consumed.insert(*input);
        }
        let mut tracked = 0usize;
        for (index, output) in stx.tx.outputs.iter().enumerate() {
            let reference = StateRef::new(tx_id, index as u32);
            if !inner.consumed.contains(&reference) && self.is_relevant(&output.data) {
                inner.unconsumed.insert(reference, output.clone());
                tracked += 1;
            }
        }
        inner.transactions.insert(tx_id, stx.clone());
        tracing::debug!(
            tx_id = %tx_id,
            consumed = stx.tx.inputs.len(),
            tracked,
            "vault recorded transaction"
        );
        true
    }

    pub fn transaction(&self, id: &SecureHash) -> Option<SignedTransaction> {
        self.inner.read().transactions.get(id).cloned()
    }

    pub fn transaction_count(&self) -> usize {
        self.inner.read().transactions.len()
    }

    pub fn is_consumed(&self, reference: &StateRef) -> bool {
        self.inner.read().consumed.contains(reference)
    }

    // -----------------------------------------------------------------------
    // IOU queries
    // -----------------------------------------------------------------------

    /// The unique current version of the IOU, if it is unconsumed here.
    pub fn query_iou_by_linear_id(&self, linear_id: &UniqueIdentifier) -> Option<StateAndRef> {
        self.inner
            .read()
            .unconsumed
            .iter()
            .find(|(_, ts)| {
                ts.data
                    .as_iou()
                    .map_or(false, |iou| iou.linear_id == *linear_id)
            })
            .map(|(r, ts)| StateAndRef {
                state: ts.clone(),
                reference: *r,
            })
    }

    pub fn unconsumed_ious(&self) -> Vec<StateAndRef> {
        self.unconsumed_matching(|data| data.as_iou().is_some())
    }

    // -----------------------------------------------------------------------
    // Cash queries
    // -----------------------------------------------------------------------

    /// Unconsumed cash this node owns, in `StateRef` order.
    pub fn unconsumed_cash(&self, currency: &Currency) -> Vec<StateAndRef> {
        self.unconsumed_matching(|data| {
            data.as_cash()
                .map_or(false, |c| c.amount.currency == *currency && self.keys.owns(c.owner.owning_key()))
        })
    }

    /// Owned cash that is free or already reserved by `lock_id`.
    pub fn spendable_cash(&self, currency: &Currency, lock_id: Uuid) -> Vec<StateAndRef> {
        let cash = self.unconsumed_cash(currency);
        let inner = self.inner.read();
        cash.into_iter()
            .filter(|s| inner.soft_locks.get(&s.reference).map_or(true, |id| *id == lock_id))
            .collect()
    }

    /// Total owned cash in `currency`, reserved or not.
    pub fn cash_balance(&self, currency: &Currency) -> Result<Amount, AmountError> {
        let cash = self.unconsumed_cash(currency);
        Amount::sum(cash.iter().filter_map(|s| s.cash()).map(|c| &c.amount), currency)
    }

    /// Owned cash in `currency` available to `lock_id`.
    pub fn spendable_balance(&self, currency: &Currency, lock_id: Uuid) -> Result<Amount, AmountError> {
        let cash = self.spendable_cash(currency, lock_id);
        Amount::sum(cash.iter().filter_map(|s| s.cash()).map(|c| &c.amount), currency)
    }

    fn unconsumed_matching(&self, pred: impl Fn(&ContractState) -> bool) -> Vec<StateAndRef> {
        self.inner
            .read()
            .unconsumed
            .iter()
            .filter(|(_, ts)| pred(&ts.data))
            .map(|(r, ts)| StateAndRef {
                state: ts.clone(),
                reference: *r,
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Soft locks
    // -----------------------------------------------------------------------

    /// Pick owned cash spendable by `lock_id`, in `StateRef` order, until
    /// `amount` is covered, and reserve it for `lock_id`.
    ///
    /// Selection and reservation happen under one write lock, so two flows
    /// selecting at once never pick the same state.
    pub fn select_and_reserve(
        &self,
        amount: &Amount,
        lock_id: Uuid,
    ) -> Result<Vec<StateAndRef>, VaultError> {
        let mut inner = self.inner.write();
        let mut gathered = Amount::zero(amount.currency.clone());
        let mut selected = Vec::new();
        for (reference, ts) in &inner.unconsumed {
            if gathered.quantity >= amount.quantity {
                break;
            }
            let Some(cash) = ts.data.as_cash() else {
                continue;
            };
            if cash.amount.currency != amount.currency || !self.keys.owns(cash.owner.owning_key()) {
                continue;
            }
            if inner.soft_locks.get(reference).map_or(false, |id| *id != lock_id) {
                continue;
            }
            gathered = gathered.checked_add(&cash.amount)?;
            selected.push(StateAndRef {
                state: ts.clone(),
                reference: *reference,
            });
        }
        if gathered.quantity < amount.quantity {
            return Err(VaultError::Insufficient {
                requested: amount.clone(),
                available: gathered,
            });
        }
        for s in &selected {
            inner.soft_locks.insert(s.reference, lock_id);
        }
        Ok(selected)
    }

    /// Release everything held by `lock_id`. Returns how many states were
    /// freed.
    pub fn soft_lock_release(&self, lock_id: Uuid) -> usize {
        let mut inner = self.inner.write();
        let before = inner.soft_locks.len();
        inner.soft_locks.retain(|_, holder| *holder != lock_id);
        before - inner.soft_locks.len()
    }

    pub fn soft_locked(&self, lock_id: Uuid) -> Vec<StateRef> {
        let inner = self.inner.read();
        let mut refs: Vec<StateRef> = inner
            .soft_locks
            .iter()
            .filter(|(_, holder)| **holder == lock_id)
            .map(|(r, _)| *r)
            .collect();
        refs.sort();
        refs
    }
}

impl StateResolver for Vault {
    fn resolve_transaction(&self, id: &SecureHash) -> Option<SignedTransaction> {
        self.transaction(id)
    }
}

/// Dependencies shipped with a proposal, falling back to the local vault.
pub struct WithDependencies<'a> {
    pub dependencies: &'a [SignedTransaction],
    pub vault: &'a Vault,
}

impl StateResolver for WithDependencies<'_> {
    fn resolve_transaction(&self, id: &SecureHash) -> Option<SignedTransaction> {
        self.dependencies
            .resolve_transaction(id)
            .or_else(|| self.vault.transaction(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iou_protocol::{
        CashCommand, CashState, IouCommand, IouState, Keypair, Party, PartyAndReference,
        TransactionBuilder,
    };

    struct Fixture {
        keys: Arc<KeyManagementService>,
        vault: Vault,
        notary: Party,
    }

    fn fixture() -> Fixture {
        let keys = Arc::new(KeyManagementService::generate("Alice"));
        let vault = Vault::new(keys.clone());
        let notary = Party::new("Notary", Keypair::generate().public_key());
        Fixture { keys, vault, notary }
    }

    fn usd(q: u64) -> Amount {
        Amount::new(q, Currency::USD)
    }

    fn issue_cash(f: &Fixture, amounts: &[u64]) -> SignedTransaction {
        let me = f.keys.identity().clone();
        let mut b = TransactionBuilder::new(f.notary.clone());
        for q in amounts {
            b.add_output_state(CashState::new(
                usd(*q),
                me.clone(),
                PartyAndReference::new(me.clone(), [0]),
            ));
        }
        b.add_command(CashCommand::Issue, vec![me.owning_key.clone()]);
        SignedTransaction::new(b.to_wire_transaction().unwrap(), vec![])
    }

    #[test]
    fn records_relevant_outputs_once() {
        let f = fixture();
        let stx = issue_cash(&f, &[500, 250]);
        assert!(f.vault.record_transaction(&stx));
        assert!(!f.vault.record_transaction(&stx));
        assert_eq!(f.vault.cash_balance(&Currency::USD).unwrap(), usd(750));
        assert_eq!(f.vault.cash_balance(&Currency::GBP).unwrap(), Amount::zero(Currency::GBP));
        assert_eq!(f.vault.transaction_count(), 1);
    }

    #[test]
    fn ignores_irrelevant_states() {
        let f = fixture();
        let a = Party::new("A", Keypair::generate().public_key());
        let b = Party::new("B", Keypair::generate().public_key());
        let iou = IouState::new(usd(100), a, b);
        let mut builder = TransactionBuilder::new(f.notary.clone());
        builder
            .add_output_state(iou.clone())
            .add_command(IouCommand::Issue, iou.participants());
        let stx = SignedTransaction::new(builder.to_wire_transaction().unwrap(), vec![]);

        f.vault.record_transaction(&stx);
        assert!(f.vault.unconsumed_ious().is_empty());
        assert!(f.vault.transaction(&stx.id()).is_some());
    }

    #[test]
    fn consuming_transaction_removes_inputs() {
        let f = fixture();
        let me = f.keys.identity().clone();
        let iou = IouState::new(usd(100), me.clone(), Party::new("B", Keypair::generate().public_key()));
        let mut issue = TransactionBuilder::new(f.notary.clone());
        issue
            .add_output_state(iou.clone())
            .add_command(IouCommand::Issue, iou.participants());
        let issued = SignedTransaction::new(issue.to_wire_transaction().unwrap(), vec![]);
        f.vault.record_transaction(&issued);

        let current = f.vault.query_iou_by_linear_id(&iou.linear_id).unwrap();
        let mut settle = TransactionBuilder::new(f.notary.clone());
        settle
            .add_input_state(current.clone())
            .add_command(IouCommand::Settle, iou.participants());
        let settled = SignedTransaction::new(settle.to_wire_transaction().unwrap(), vec![]);
        f.vault.record_transaction(&settled);

        assert!(f.vault.query_iou_by_linear_id(&iou.linear_id).is_none());
        assert!(f.vault.is_consumed(&current.reference));
    }

    #[test]
    fn soft_locks_hide_cash_from_other_flows() {
        let f = fixture();
        let stx = issue_cash(&f, &[500, 250]);
        f.vault.record_transaction(&stx);
        let first = StateRef::new(stx.id(), 0);
        let (mine, theirs) = (Uuid::new_v4(), Uuid::new_v4());

        let picked = f.vault.select_and_reserve(&usd(400), mine).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(f.vault.soft_locked(mine), vec![first]);
        assert_eq!(f.vault.spendable_balance(&Currency::USD, mine).unwrap(), usd(750));
        assert_eq!(f.vault.spendable_balance(&Currency::USD, theirs).unwrap(), usd(250));
        assert_eq!(
            f.vault.select_and_reserve(&usd(400), theirs),
            Err(VaultError::Insufficient {
                requested: usd(400),
                available: usd(250)
            })
        );

        assert_eq!(f.vault.soft_lock_release(mine), 1);
        assert_eq!(f.vault.spendable_balance(&Currency::USD, theirs).unwrap(), usd(750));
    }

    #[test]
    fn concurrent_selections_pick_disjoint_cash() {
        let f = Arc::new(fixture());
        let stx = issue_cash(&f, &[100, 100, 100, 100]);
        f.vault.record_transaction(&stx);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let f = Arc::clone(&f);
                std::thread::spawn(move || {
                    let lock = Uuid::new_v4();
                    let picked = f.vault.select_and_reserve(&usd(150), lock).unwrap();
                    (lock, picked.into_iter().map(|s| s.reference).collect::<Vec<_>>())
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let (a, b) = (&results[0].1, &results[1].1);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert!(a.iter().all(|r| !b.contains(r)));
        for (lock, refs) in &results {
            assert_eq!(&f.vault.soft_locked(*lock), refs);
        }
    }

    #[test]
    fn failed_selection_reserves_nothing() {
        let f = fixture();
        let stx = issue_cash(&f, &[100]);
        f.vault.record_transaction(&stx);
        let lock = Uuid::new_v4();

        assert_eq!(
            f.vault.select_and_reserve(&usd(150), lock),
            Err(VaultError::Insufficient {
                requested: usd(150),
                available: usd(100)
            })
        );
        assert!(f.vault.soft_locked(lock).is_empty());
    }
}
