//! # Cash Contract
//!
//! Just enough asset logic to pay IOUs with. Cash is grouped by currency and
//! issuer; within a group:
//!
//! - **Issue** creates cash from nothing. The issuer must sign.
//! - **Move** reassigns cash. Inputs and outputs must balance exactly, and
//!   every input owner must sign.
//!
//! Outputs are always positive. Exits and netting are not supported.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use iou_protocol::state::cash::CashGroupKey;
use iou_protocol::transaction::types::{Amount, AmountError};
use iou_protocol::{CashCommand, CashState, LedgerTransaction, PublicKey};

use crate::ViolationKind;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CashViolation {
    /// Cash states present but not exactly one cash command.
    #[error("a cash transaction must carry exactly one cash command, found {count}")]
    CommandCount { count: usize },

    /// A cash command with no cash states to govern.
    #[error("a cash command requires cash states")]
    NoCashStates,

    #[error("cash issuance must not consume cash ({currency} from {issuer})")]
    IssueConsumesInputs { currency: String, issuer: String },

    #[error("cash move has no inputs for {currency} from {issuer}")]
    MoveWithoutInputs { currency: String, issuer: String },

    #[error("cash outputs must be positive")]
    ZeroOutput,

    #[error("cash inputs ({inputs}) and outputs ({outputs}) do not balance")]
    Unbalanced { inputs: Amount, outputs: Amount },

    #[error("cash issuance must be signed by the issuer {issuer}")]
    IssuerNotSigner { issuer: String },

    #[error("cash move must be signed by input owner {owner}")]
    OwnerNotSigner { owner: PublicKey },

    #[error("amount arithmetic failed: {0}")]
    Arithmetic(#[from] AmountError),
}

impl CashViolation {
    pub fn kind(&self) -> ViolationKind {
        use CashViolation::*;
        match self {
            CommandCount { .. }
            | NoCashStates
            | IssueConsumesInputs { .. }
            | MoveWithoutInputs { .. } => ViolationKind::Structural,
            ZeroOutput | Unbalanced { .. } | Arithmetic(_) => ViolationKind::Value,
            IssuerNotSigner { .. } | OwnerNotSigner { .. } => ViolationKind::Authorization,
        }
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CashGroup<'a> {
    inputs: Vec<&'a CashState>,
    outputs: Vec<&'a CashState>,
}

fn group_cash(tx: &LedgerTransaction) -> BTreeMap<CashGroupKey, CashGroup<'_>> {
    let mut groups: BTreeMap<CashGroupKey, CashGroup<'_>> = BTreeMap::new();
    for cash in tx.cash_inputs() {
        groups.entry(cash.group_key()).or_default().inputs.push(cash);
    }
    for cash in tx.cash_outputs() {
        groups.entry(cash.group_key()).or_default().outputs.push(cash);
    }
    groups
}

/// Verify the cash rules for `tx`.
pub fn verify(tx: &LedgerTransaction) -> Result<(), CashViolation> {
    let commands = tx.cash_commands();
    let (command, signers) = match commands.as_slice() {
        [single] => *single,
        other => return Err(CashViolation::CommandCount { count: other.len() }),
    };
    let signers: BTreeSet<&PublicKey> = signers.iter().collect();

    let groups = group_cash(tx);
    if groups.is_empty() {
        return Err(CashViolation::NoCashStates);
    }

    for (key, group) in &groups {
        if group.outputs.iter().any(|c| c.amount.is_zero()) {
            return Err(CashViolation::ZeroOutput);
        }
        match command {
            CashCommand::Issue => {
                // Issuer name for messages; the key is what is checked.
                let issuer = group
                    .outputs
                    .first()
                    .or(group.inputs.first())
                    .map(|c| c.issuer.party.name.clone())
                    .unwrap_or_default();
                if !group.inputs.is_empty() {
                    return Err(CashViolation::IssueConsumesInputs {
                        currency: key.currency.to_string(),
                        issuer,
                    });
                }
                if !signers.contains(&key.issuer_key) {
                    return Err(CashViolation::IssuerNotSigner { issuer });
                }
            }
            CashCommand::Move => {
                if group.inputs.is_empty() {
                    let issuer = group
                        .outputs
                        .first()
                        .map(|c| c.issuer.party.name.clone())
                        .unwrap_or_default();
                    return Err(CashViolation::MoveWithoutInputs {
                        currency: key.currency.to_string(),
                        issuer,
                    });
                }
                let inputs = Amount::sum(group.inputs.iter().map(|c| &c.amount), &key.currency)?;
                let outputs = Amount::sum(group.outputs.iter().map(|c| &c.amount), &key.currency)?;
                if inputs != outputs {
                    return Err(CashViolation::Unbalanced { inputs, outputs });
                }
                for input in &group.inputs {
                    let owner = input.owner.owning_key();
                    if !signers.contains(owner) {
                        return Err(CashViolation::OwnerNotSigner {
                            owner: owner.clone(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use iou_protocol::state::PartyAndReference;
    use iou_protocol::{Currency, Keypair, Party, TransactionBuilder};

    fn party(name: &str) -> Party {
        Party::new(name, Keypair::generate().public_key())
    }

    fn cash(q: u64, owner: &Party, issuer: &Party) -> CashState {
        CashState::new(
            Amount::new(q, Currency::USD),
            owner.clone(),
            PartyAndReference::new(issuer.clone(), [0]),
        )
    }

    #[test]
    fn self_issue_signed_by_issuer() {
        let bank = party("Bank");
        let mut b = TransactionBuilder::new(party("Notary"));
        b.add_output_state(cash(500, &bank, &bank))
            .add_command(CashCommand::Issue, vec![bank.owning_key.clone()]);
        assert_eq!(verify(&b.to_ledger_transaction().unwrap()), Ok(()));
    }

    #[test]
    fn issue_not_signed_by_issuer() {
        let bank = party("Bank");
        let alice = party("Alice");
        let mut b = TransactionBuilder::new(party("Notary"));
        b.add_output_state(cash(500, &alice, &bank))
            .add_command(CashCommand::Issue, vec![alice.owning_key.clone()]);
        let err = verify(&b.to_ledger_transaction().unwrap()).unwrap_err();
        assert_eq!(
            err,
            CashViolation::IssuerNotSigner {
                issuer: "Bank".into()
            }
        );
        assert_eq!(err.kind(), ViolationKind::Authorization);
    }

    #[test]
    fn zero_output_rejected() {
        let bank = party("Bank");
        let mut b = TransactionBuilder::new(party("Notary"));
        b.add_output_state(cash(0, &bank, &bank))
            .add_command(CashCommand::Issue, vec![bank.owning_key.clone()]);
        assert_eq!(
            verify(&b.to_ledger_transaction().unwrap()),
            Err(CashViolation::ZeroOutput)
        );
    }

    #[test]
    fn cash_states_without_command_rejected() {
        let bank = party("Bank");
        let mut b = TransactionBuilder::new(party("Notary"));
        b.add_output_state(cash(10, &bank, &bank))
            .add_command(iou_protocol::IouCommand::Settle, vec![]);
        assert_eq!(
            verify(&b.to_ledger_transaction().unwrap()),
            Err(CashViolation::CommandCount { count: 0 })
        );
    }
}
