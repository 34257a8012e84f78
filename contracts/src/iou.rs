//! # IOU Contract
//!
//! Decides whether a transaction is a legal step in the life of an IOU:
//!
//! 1. **Issue** — nothing consumed, one IOU produced, positive amount,
//!    distinct lender and borrower, signed by exactly the two of them.
//! 2. **Transfer** — one IOU in, one out, only the lender changes, signed by
//!    the borrower and both lenders.
//! 3. **Settle** — one IOU in; cash paid to the lender in the IOU's
//!    currency, no more than is outstanding; a successor with the increased
//!    `paid` unless the debt is cleared; signed by lender and borrower.
//!
//! Exactly one IOU command must be present. Dispatch is a closed match on
//! it, and each arm checks structure, then values, then signers, stopping at
//! the first broken rule.
//!
//! Parties are compared by owning key.

use std::collections::BTreeSet;
use thiserror::Error;

use iou_protocol::transaction::types::{Amount, AmountError, Currency};
use iou_protocol::{IouCommand, LedgerTransaction, PublicKey};

use crate::ViolationKind;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// One variant per rule of the IOU contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IouViolation {
    // ----- Command -----
    /// No IOU command in the transaction.
    #[error("an IOU transaction must carry an IOU command")]
    MissingCommand,

    /// More than one IOU command in the transaction.
    #[error("an IOU transaction must carry exactly one IOU command, found {count}")]
    MultipleCommands { count: usize },

    // ----- Issue -----
    #[error("no inputs should be consumed when issuing an IOU, found {count}")]
    IssueConsumesInputs { count: usize },

    #[error("only one output state should be created when issuing an IOU, found {count}")]
    IssueOutputCount { count: usize },

    #[error("a newly issued IOU must have a positive amount")]
    NonPositiveAmount,

    #[error("the lender and borrower cannot have the same identity")]
    SameLenderAndBorrower,

    /// `paid` must be denominated like `amount`.
    #[error("paid is in {paid} but the IOU is in {amount}")]
    PaidCurrencyMismatch { amount: Currency, paid: Currency },

    /// An IOU with nothing left to pay cannot be issued.
    #[error("paid ({paid}) must be below the IOU amount ({amount})")]
    PaidNotBelowAmount { amount: Amount, paid: Amount },

    // ----- Transfer -----
    #[error("an IOU transfer should consume exactly one input state, found {count}")]
    TransferInputCount { count: usize },

    #[error("an IOU transfer should create exactly one output state, found {count}")]
    TransferOutputCount { count: usize },

    #[error("the borrower may not change in a transfer")]
    BorrowerChanged,

    #[error("the lender must change in a transfer")]
    LenderUnchanged,

    #[error("only the lender may change in a transfer")]
    NonLenderFieldChanged,

    // ----- Settle -----
    #[error("a settlement must involve exactly one IOU, found {count}")]
    SettleGroupCount { count: usize },

    #[error("a settlement must consume exactly one input IOU, found {count}")]
    SettleInputCount { count: usize },

    #[error("a settlement must produce output cash")]
    NoCashOutput,

    #[error("a settlement must produce output cash paid to the lender")]
    NoCashToLender,

    #[error("settlement is in {found} but the IOU is in {expected}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error("the amount settled ({settled}) cannot exceed the amount outstanding ({outstanding})")]
    OverSettlement { settled: Amount, outstanding: Amount },

    #[error("a fully settled IOU must have no successor, found {count}")]
    FullySettledHasSuccessor { count: usize },

    #[error("a partial settlement must produce exactly one successor IOU, found {count}")]
    PartialSettleOutputCount { count: usize },

    #[error("the {field} may not change when settling")]
    SettleFieldChanged { field: &'static str },

    #[error("the successor must record {expected} paid, found {actual}")]
    SuccessorPaidMismatch { expected: Amount, actual: Amount },

    // ----- Shared -----
    /// Amount arithmetic failed on contract-supplied values.
    #[error("amount arithmetic failed: {0}")]
    Arithmetic(#[from] AmountError),

    /// The command's signers are not exactly the keys the rule requires.
    #[error("{command} must be signed by exactly {}, signed by {}", keys(.expected), keys(.actual))]
    SignersMismatch {
        command: IouCommand,
        expected: Vec<PublicKey>,
        actual: Vec<PublicKey>,
    },
}

fn keys(keys: &[PublicKey]) -> String {
    let shorts: Vec<String> = keys.iter().map(|k| k.short()).collect();
    format!("[{}]", shorts.join(", "))
}

impl IouViolation {
    pub fn kind(&self) -> ViolationKind {
        use IouViolation::*;
        match self {
            MissingCommand
            | MultipleCommands { .. }
            | IssueConsumesInputs { .. }
            | IssueOutputCount { .. }
            | TransferInputCount { .. }
            | TransferOutputCount { .. }
            | SettleGroupCount { .. }
            | SettleInputCount { .. }
            | NoCashOutput
            | NoCashToLender
            | FullySettledHasSuccessor { .. }
            | PartialSettleOutputCount { .. } => ViolationKind::Structural,

            NonPositiveAmount
            | SameLenderAndBorrower
            | PaidCurrencyMismatch { .. }
            | PaidNotBelowAmount { .. }
            | BorrowerChanged
            | LenderUnchanged
            | NonLenderFieldChanged
            | CurrencyMismatch { .. }
            | OverSettlement { .. }
            | SettleFieldChanged { .. }
            | SuccessorPaidMismatch { .. }
            | Arithmetic(_) => ViolationKind::Value,

            SignersMismatch { .. } => ViolationKind::Authorization,
        }
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify the IOU rules for `tx`.
pub fn verify(tx: &LedgerTransaction) -> Result<(), IouViolation> {
    let commands = tx.iou_commands();
    let (command, signers) = match commands.as_slice() {
        [] => return Err(IouViolation::MissingCommand),
        [single] => *single,
        many => return Err(IouViolation::MultipleCommands { count: many.len() }),
    };
    let signers: BTreeSet<PublicKey> = signers.iter().cloned().collect();

    match command {
        IouCommand::Issue => verify_issue(tx, &signers),
        IouCommand::Transfer => verify_transfer(tx, &signers),
        IouCommand::Settle => verify_settle(tx, &signers),
    }
}

/// Issue: create the first version of an IOU.
pub fn verify_issue(
    tx: &LedgerTransaction,
    signers: &BTreeSet<PublicKey>,
) -> Result<(), IouViolation> {
    if !tx.inputs.is_empty() {
        return Err(IouViolation::IssueConsumesInputs {
            count: tx.inputs.len(),
        });
    }
    let outputs = tx.iou_outputs();
    let [iou] = outputs.as_slice() else {
        return Err(IouViolation::IssueOutputCount {
            count: outputs.len(),
        });
    };

    if iou.amount.quantity == 0 {
        return Err(IouViolation::NonPositiveAmount);
    }
    if iou.lender.owning_key == iou.borrower.owning_key {
        return Err(IouViolation::SameLenderAndBorrower);
    }
    if !iou.paid.same_currency(&iou.amount) {
        return Err(IouViolation::PaidCurrencyMismatch {
            amount: iou.amount.currency.clone(),
            paid: iou.paid.currency.clone(),
        });
    }
    if iou.paid.quantity >= iou.amount.quantity {
        return Err(IouViolation::PaidNotBelowAmount {
            amount: iou.amount.clone(),
            paid: iou.paid.clone(),
        });
    }

    require_signers(IouCommand::Issue, key_set(&iou.participants()), signers)
}

/// Transfer: hand the IOU to a new lender.
pub fn verify_transfer(
    tx: &LedgerTransaction,
    signers: &BTreeSet<PublicKey>,
) -> Result<(), IouViolation> {
    let inputs = tx.iou_inputs();
    let outputs = tx.iou_outputs();
    if inputs.len() != 1 {
        return Err(IouViolation::TransferInputCount {
            count: inputs.len(),
        });
    }
    if outputs.len() != 1 {
        return Err(IouViolation::TransferOutputCount {
            count: outputs.len(),
        });
    }
    let (input, output) = (inputs[0], outputs[0]);

    if output.borrower.owning_key != input.borrower.owning_key {
        return Err(IouViolation::BorrowerChanged);
    }
    if output.lender.owning_key == input.lender.owning_key {
        return Err(IouViolation::LenderUnchanged);
    }
    if input.with_new_lender(output.lender.clone()) != *output {
        return Err(IouViolation::NonLenderFieldChanged);
    }

    let mut expected = key_set(&input.participants());
    expected.extend(output.participants());
    require_signers(IouCommand::Transfer, expected, signers)
}

/// Settle: pay down some or all of the outstanding amount.
pub fn verify_settle(
    tx: &LedgerTransaction,
    signers: &BTreeSet<PublicKey>,
) -> Result<(), IouViolation> {
    let groups = tx.group_ious_by_linear_id();
    let [group] = groups.as_slice() else {
        return Err(IouViolation::SettleGroupCount {
            count: groups.len(),
        });
    };
    let [input] = group.inputs.as_slice() else {
        return Err(IouViolation::SettleInputCount {
            count: group.inputs.len(),
        });
    };

    let cash = tx.cash_outputs();
    if cash.is_empty() {
        return Err(IouViolation::NoCashOutput);
    }
    let to_lender: Vec<&Amount> = cash
        .iter()
        .filter(|c| *c.owner.owning_key() == input.lender.owning_key)
        .map(|c| &c.amount)
        .collect();
    if to_lender.is_empty() {
        return Err(IouViolation::NoCashToLender);
    }

    let outstanding = input.outstanding()?;
    // Currency is checked before any amount comparison.
    if let Some(foreign) = to_lender.iter().find(|a| a.currency != outstanding.currency) {
        return Err(IouViolation::CurrencyMismatch {
            expected: outstanding.currency.clone(),
            found: foreign.currency.clone(),
        });
    }
    let settled = Amount::sum(to_lender.iter().copied(), &outstanding.currency)?;
    if settled.quantity > outstanding.quantity {
        return Err(IouViolation::OverSettlement {
            settled,
            outstanding,
        });
    }

    if settled == outstanding {
        if !group.outputs.is_empty() {
            return Err(IouViolation::FullySettledHasSuccessor {
                count: group.outputs.len(),
            });
        }
    } else {
        let [successor] = group.outputs.as_slice() else {
            return Err(IouViolation::PartialSettleOutputCount {
                count: group.outputs.len(),
            });
        };
        if successor.borrower.owning_key != input.borrower.owning_key {
            return Err(IouViolation::SettleFieldChanged { field: "borrower" });
        }
        if successor.amount != input.amount {
            return Err(IouViolation::SettleFieldChanged { field: "amount" });
        }
        if successor.lender.owning_key != input.lender.owning_key {
            return Err(IouViolation::SettleFieldChanged { field: "lender" });
        }
        let expected_paid = input.paid.checked_add(&settled)?;
        if successor.paid != expected_paid {
            return Err(IouViolation::SuccessorPaidMismatch {
                expected: expected_paid,
                actual: successor.paid.clone(),
            });
        }
    }

    require_signers(IouCommand::Settle, key_set(&input.participants()), signers)
}

fn key_set(keys: &[PublicKey]) -> BTreeSet<PublicKey> {
    keys.iter().cloned().collect()
}

fn require_signers(
    command: IouCommand,
    expected: BTreeSet<PublicKey>,
    actual: &BTreeSet<PublicKey>,
) -> Result<(), IouViolation> {
    if expected == *actual {
        Ok(())
    } else {
        Err(IouViolation::SignersMismatch {
            command,
            expected: expected.into_iter().collect(),
            actual: actual.iter().cloned().collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use iou_protocol::{IouState, Keypair, Party, TransactionBuilder};

    fn party(name: &str) -> Party {
        Party::new(name, Keypair::generate().public_key())
    }

    fn usd(q: u64) -> Amount {
        Amount::new(q, Currency::USD)
    }

    fn issue_tx(iou: &IouState, signers: Vec<PublicKey>) -> LedgerTransaction {
        let mut builder = TransactionBuilder::new(party("Notary"));
        builder
            .add_output_state(iou.clone())
            .add_command(IouCommand::Issue, signers);
        builder.to_ledger_transaction().unwrap()
    }

    #[test]
    fn issue_happy_path() {
        let iou = IouState::new(usd(100), party("L"), party("B"));
        assert_eq!(verify(&issue_tx(&iou, iou.participants())), Ok(()));
    }

    #[test]
    fn zero_amount_issue_is_value_violation() {
        let iou = IouState::new(usd(0), party("L"), party("B"));
        let err = verify(&issue_tx(&iou, iou.participants())).unwrap_err();
        assert_eq!(err, IouViolation::NonPositiveAmount);
        assert_eq!(err.kind(), ViolationKind::Value);
    }

    #[test]
    fn self_lending_is_rejected() {
        let alice = party("Alice");
        let iou = IouState::new(usd(100), alice.clone(), alice);
        assert_eq!(
            verify(&issue_tx(&iou, iou.participants())),
            Err(IouViolation::SameLenderAndBorrower)
        );
    }

    #[test]
    fn issue_signed_by_borrower_only_is_authorization_violation() {
        let iou = IouState::new(usd(100), party("L"), party("B"));
        let err = verify(&issue_tx(&iou, vec![iou.borrower.owning_key.clone()])).unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Authorization);
    }

    #[test]
    fn issue_with_extra_signer_is_rejected() {
        let iou = IouState::new(usd(100), party("L"), party("B"));
        let mut signers = iou.participants();
        signers.push(Keypair::generate().public_key());
        match verify(&issue_tx(&iou, signers)) {
            Err(IouViolation::SignersMismatch { expected, actual, .. }) => {
                assert_eq!(expected.len(), 2);
                assert_eq!(actual.len(), 3);
            }
            other => panic!("expected SignersMismatch, got {:?}", other),
        }
    }

    #[test]
    fn issue_already_paid_is_rejected() {
        let mut iou = IouState::new(usd(100), party("L"), party("B"));
        iou.paid = usd(100);
        match verify(&issue_tx(&iou, iou.participants())) {
            Err(IouViolation::PaidNotBelowAmount { .. }) => {}
            other => panic!("expected PaidNotBelowAmount, got {:?}", other),
        }
    }

    #[test]
    fn missing_command_is_structural() {
        let iou = IouState::new(usd(100), party("L"), party("B"));
        let mut tx = issue_tx(&iou, iou.participants());
        tx.commands.clear();
        let err = verify(&tx).unwrap_err();
        assert_eq!(err, IouViolation::MissingCommand);
        assert_eq!(err.kind(), ViolationKind::Structural);
    }

    #[test]
    fn two_commands_are_rejected() {
        let iou = IouState::new(usd(100), party("L"), party("B"));
        let mut tx = issue_tx(&iou, iou.participants());
        tx.commands.push(tx.commands[0].clone());
        assert_eq!(verify(&tx), Err(IouViolation::MultipleCommands { count: 2 }));
    }
}
