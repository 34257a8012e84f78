//! Cash spending.
//!
//! [`generate_spend`] adds to a transaction builder everything needed to move
//! `amount` of cash to a payee: the selected inputs, payment outputs, change
//! outputs and a signed `Cash.Move` command.
//!
//! Selection is deterministic: owned, spendable cash in `StateRef` order until
//! the amount is covered. Change goes to a fresh confidential key of the
//! payer, so the payee cannot link it to the payer's legal identity without
//! identity sync.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use uuid::Uuid;

use iou_protocol::state::CashGroupKey;
use iou_protocol::{
    Amount, AmountError, CashCommand, CashState, Party, PublicKey, StateAndRef,
    TransactionBuilder,
};

use super::keys::{KeyManagementService, KeyServiceError};
use super::vault::{Vault, VaultError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpendError {
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("cannot spend a zero amount")]
    ZeroAmount,

    #[error(transparent)]
    Arithmetic(#[from] AmountError),

    #[error(transparent)]
    Lock(#[from] VaultError),

    #[error("change key: {0}")]
    ChangeKey(String),
}

impl From<KeyServiceError> for SpendError {
    fn from(e: KeyServiceError) -> Self {
        SpendError::ChangeKey(e.to_string())
    }
}

/// Move `amount` from this node's cash to `payee`.
///
/// The selected inputs are soft-locked under `lock_id`; the caller releases
/// the lock when its flow ends. Returns the owner keys that must sign.
pub fn generate_spend(
    vault: &Vault,
    keys: &KeyManagementService,
    builder: &mut TransactionBuilder,
    amount: &Amount,
    payee: &Party,
    lock_id: Uuid,
) -> Result<Vec<PublicKey>, SpendError> {
    if amount.is_zero() {
        return Err(SpendError::ZeroAmount);
    }

    let selected = match vault.select_and_reserve(amount, lock_id) {
        Ok(selected) => selected,
        Err(VaultError::Insufficient {
            requested,
            available,
        }) => {
            return Err(SpendError::InsufficientBalance {
                requested,
                available,
            })
        }
        Err(e) => return Err(e.into()),
    };
    let input_count = selected.len();

    let mut groups: BTreeMap<CashGroupKey, Vec<&CashState>> = BTreeMap::new();
    for cash in selected.iter().filter_map(StateAndRef::cash) {
        groups.entry(cash.group_key()).or_default().push(cash);
    }

    let mut remaining = amount.clone();
    for states in groups.values() {
        let group_total = Amount::sum(states.iter().map(|c| &c.amount), &amount.currency)?;
        let pay = if group_total.quantity < remaining.quantity {
            group_total.clone()
        } else {
            remaining.clone()
        };
        let change = group_total.checked_sub(&pay)?;
        remaining = remaining.checked_sub(&pay)?;

        let issuer = states[0].issuer.clone();
        if !pay.is_zero() {
            builder.add_output_state(CashState::new(pay, payee.clone(), issuer.clone()));
        }
        if !change.is_zero() {
            let change_key = keys.fresh_confidential_identity()?.anonymous_party();
            builder.add_output_state(CashState::new(change, change_key, issuer));
        }
    }

    let owners: BTreeSet<PublicKey> = selected
        .iter()
        .filter_map(StateAndRef::cash)
        .map(|c| c.owner.owning_key().clone())
        .collect();
    let owners: Vec<PublicKey> = owners.into_iter().collect();
    for input in selected {
        builder.add_input_state(input);
    }
    builder.add_command(CashCommand::Move, owners.clone());

    tracing::debug!(
        amount = %amount,
        payee = %payee,
        inputs = input_count,
        "generated cash spend"
    );
    Ok(owners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iou_protocol::{Currency, Keypair, PartyAndReference, SignedTransaction};
    use std::sync::Arc;

    fn usd(q: u64) -> Amount {
        Amount::new(q, Currency::USD)
    }

    struct Wallet {
        keys: Arc<KeyManagementService>,
        vault: Vault,
        notary: Party,
    }

    fn wallet_with(amounts: &[u64]) -> Wallet {
        let keys = Arc::new(KeyManagementService::generate("Borrower"));
        let vault = Vault::new(keys.clone());
        let notary = Party::new("Notary", Keypair::generate().public_key());
        let me = keys.identity().clone();
        let mut b = TransactionBuilder::new(notary.clone());
        for q in amounts {
            b.add_output_state(CashState::new(
                usd(*q),
                me.clone(),
                PartyAndReference::new(me.clone(), [0]),
            ));
        }
        b.add_command(CashCommand::Issue, vec![me.owning_key.clone()]);
        vault.record_transaction(&SignedTransaction::new(b.to_wire_transaction().unwrap(), vec![]));
        Wallet { keys, vault, notary }
    }

    fn payee() -> Party {
        Party::new("Lender", Keypair::generate().public_key())
    }

    #[test]
    fn exact_spend_has_no_change() {
        let w = wallet_with(&[4_000]);
        let lender = payee();
        let mut b = TransactionBuilder::new(w.notary.clone());
        let signers =
            generate_spend(&w.vault, &w.keys, &mut b, &usd(4_000), &lender, Uuid::new_v4()).unwrap();

        assert_eq!(signers, vec![w.keys.legal_key()]);
        assert_eq!(b.inputs().len(), 1);
        assert_eq!(b.outputs().len(), 1);
        let paid = b.outputs()[0].data.as_cash().unwrap();
        assert_eq!(paid.owner, lender);
        assert_eq!(paid.amount, usd(4_000));
    }

    #[test]
    fn change_goes_to_a_confidential_key() {
        let w = wallet_with(&[3_000, 3_000]);
        let mut b = TransactionBuilder::new(w.notary.clone());
        generate_spend(&w.vault, &w.keys, &mut b, &usd(4_000), &payee(), Uuid::new_v4()).unwrap();

        assert_eq!(b.inputs().len(), 2);
        let change = b.outputs()[1].data.as_cash().unwrap();
        assert_eq!(change.amount, usd(2_000));
        assert!(change.owner.is_anonymous());
        assert!(w.keys.owns(change.owner.owning_key()));
        assert!(b.to_ledger_transaction().is_ok());
    }

    #[test]
    fn insufficient_balance_reports_what_is_available() {
        let w = wallet_with(&[1_000]);
        let mut b = TransactionBuilder::new(w.notary.clone());
        let result = generate_spend(&w.vault, &w.keys, &mut b, &usd(5_000), &payee(), Uuid::new_v4());
        assert_eq!(
            result,
            Err(SpendError::InsufficientBalance {
                requested: usd(5_000),
                available: usd(1_000),
            })
        );
        assert!(b.inputs().is_empty());
    }

    #[test]
    fn selected_cash_is_locked_against_other_flows() {
        let w = wallet_with(&[1_000]);
        let first = Uuid::new_v4();
        let mut b1 = TransactionBuilder::new(w.notary.clone());
        generate_spend(&w.vault, &w.keys, &mut b1, &usd(1_000), &payee(), first).unwrap();

        let mut b2 = TransactionBuilder::new(w.notary.clone());
        let second = generate_spend(&w.vault, &w.keys, &mut b2, &usd(1_000), &payee(), Uuid::new_v4());
        assert!(matches!(second, Err(SpendError::InsufficientBalance { .. })));

        w.vault.soft_lock_release(first);
        let mut b3 = TransactionBuilder::new(w.notary.clone());
        assert!(generate_spend(&w.vault, &w.keys, &mut b3, &usd(1_000), &payee(), Uuid::new_v4()).is_ok());
    }

    #[test]
    fn zero_amount_is_refused() {
        let w = wallet_with(&[1_000]);
        let mut b = TransactionBuilder::new(w.notary.clone());
        assert_eq!(
            generate_spend(&w.vault, &w.keys, &mut b, &usd(0), &payee(), Uuid::new_v4()),
            Err(SpendError::ZeroAmount)
        );
    }
}
