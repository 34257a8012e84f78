//! The resolved form of a transaction, which is what contracts verify.
//!
//! Where a [`super::WireTransaction`] names its inputs by reference, a
//! [`LedgerTransaction`] carries the input states themselves. Contracts never
//! do lookups; every fact they need is right here.

use std::collections::BTreeMap;

use crate::crypto::{PublicKey, SecureHash};
use crate::identity::Party;
use crate::state::{CashState, ContractState, IouState, StateAndRef, TransactionState, UniqueIdentifier};
use crate::transaction::command::{CashCommand, Command, CommandData, IouCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub id: SecureHash,
    pub inputs: Vec<StateAndRef>,
    pub outputs: Vec<TransactionState>,
    pub commands: Vec<Command>,
    pub notary: Party,
}

/// The versions of one linear IOU consumed and produced by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IouGroup<'a> {
    pub linear_id: &'a UniqueIdentifier,
    pub inputs: Vec<&'a IouState>,
    pub outputs: Vec<&'a IouState>,
}

impl LedgerTransaction {
    pub fn input_states(&self) -> impl Iterator<Item = &ContractState> {
        self.inputs.iter().map(|s| &s.state.data)
    }

    pub fn output_states(&self) -> impl Iterator<Item = &ContractState> {
        self.outputs.iter().map(|s| &s.data)
    }

    pub fn iou_inputs(&self) -> Vec<&IouState> {
        self.input_states().filter_map(ContractState::as_iou).collect()
    }

    pub fn iou_outputs(&self) -> Vec<&IouState> {
        self.output_states().filter_map(ContractState::as_iou).collect()
    }

    pub fn cash_inputs(&self) -> Vec<&CashState> {
        self.input_states().filter_map(ContractState::as_cash).collect()
    }

    pub fn cash_outputs(&self) -> Vec<&CashState> {
        self.output_states().filter_map(ContractState::as_cash).collect()
    }

    /// IOU commands with their signers.
    pub fn iou_commands(&self) -> Vec<(IouCommand, &[PublicKey])> {
        self.commands
            .iter()
            .filter_map(|c| match c.value {
                CommandData::Iou(cmd) => Some((cmd, c.signers.as_slice())),
                CommandData::Cash(_) => None,
            })
            .collect()
    }

    /// Cash commands with their signers.
    pub fn cash_commands(&self) -> Vec<(CashCommand, &[PublicKey])> {
        self.commands
            .iter()
            .filter_map(|c| match c.value {
                CommandData::Cash(cmd) => Some((cmd, c.signers.as_slice())),
                CommandData::Iou(_) => None,
            })
            .collect()
    }

    /// Group IOU inputs and outputs by linear id, ordered by id.
    pub fn group_ious_by_linear_id(&self) -> Vec<IouGroup<'_>> {
        let mut groups: BTreeMap<&UniqueIdentifier, IouGroup<'_>> = BTreeMap::new();
        for iou in self.iou_inputs() {
            groups
                .entry(&iou.linear_id)
                .or_insert_with(|| IouGroup {
                    linear_id: &iou.linear_id,
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                })
                .inputs
                .push(iou);
        }
        for iou in self.iou_outputs() {
            groups
                .entry(&iou.linear_id)
                .or_insert_with(|| IouGroup {
                    linear_id: &iou.linear_id,
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                })
                .outputs
                .push(iou);
        }
        groups.into_values().collect()
    }
}
