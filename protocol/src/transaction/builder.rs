//! Transaction construction.
//!
//! A [`TransactionBuilder`] collects inputs, outputs and commands for one
//! notary. Protocols build incrementally: the settlement initiator adds the
//! IOU input, hands the builder to cash spend selection, then adds the
//! successor state. Nothing is signed here; signing happens once the wire
//! transaction (and therefore the id) is fixed.

use rand::RngCore;

use super::command::{Command, CommandData};
use super::ledger::LedgerTransaction;
use super::verification::TransactionError;
use super::wire::WireTransaction;
use crate::crypto::PublicKey;
use crate::identity::Party;
use crate::state::{ContractState, StateAndRef, TransactionState};

/// Incremental builder for [`WireTransaction`]s.
///
/// ```
/// use iou_protocol::{Amount, Currency, IouCommand, IouState, Keypair, Party, TransactionBuilder};
///
/// let lender = Party::new("Lender", Keypair::generate().public_key());
/// let borrower = Party::new("Borrower", Keypair::generate().public_key());
/// let notary = Party::new("Notary", Keypair::generate().public_key());
///
/// let iou = IouState::new(Amount::new(10_000, Currency::USD), lender, borrower);
/// let mut builder = TransactionBuilder::new(notary);
/// builder
///     .add_output_state(iou.clone())
///     .add_command(IouCommand::Issue, iou.participants());
/// let wtx = builder.to_wire_transaction().unwrap();
/// assert_eq!(wtx.outputs.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    notary: Party,
    inputs: Vec<StateAndRef>,
    outputs: Vec<TransactionState>,
    commands: Vec<Command>,
    privacy_salt: [u8; 32],
}

impl TransactionBuilder {
    /// A fresh builder with a random privacy salt.
    pub fn new(notary: Party) -> Self {
        let mut privacy_salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut privacy_salt);
        Self {
            notary,
            inputs: Vec::new(),
            outputs: Vec::new(),
            commands: Vec::new(),
            privacy_salt,
        }
    }

    pub fn notary(&self) -> &Party {
        &self.notary
    }

    pub fn add_input_state(&mut self, input: StateAndRef) -> &mut Self {
        self.inputs.push(input);
        self
    }

    /// Add an output governed by this builder's notary.
    pub fn add_output_state(&mut self, state: impl Into<ContractState>) -> &mut Self {
        self.outputs
            .push(TransactionState::new(state, self.notary.clone()));
        self
    }

    pub fn add_command(
        &mut self,
        value: impl Into<CommandData>,
        signers: Vec<PublicKey>,
    ) -> &mut Self {
        self.commands.push(Command::new(value, signers));
        self
    }

    pub fn inputs(&self) -> &[StateAndRef] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TransactionState] {
        &self.outputs
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Freeze the current contents into a wire transaction.
    pub fn to_wire_transaction(&self) -> Result<WireTransaction, TransactionError> {
        let wtx = WireTransaction::new(
            self.inputs.iter().map(|s| s.reference).collect(),
            self.outputs.clone(),
            self.commands.clone(),
            self.notary.clone(),
            self.privacy_salt,
        )?;
        super::verification::verify_structure(&wtx)?;
        Ok(wtx)
    }

    /// The resolved view of the current contents. Inputs are already full
    /// states, so no lookups are needed.
    pub fn to_ledger_transaction(&self) -> Result<LedgerTransaction, TransactionError> {
        let wtx = self.to_wire_transaction()?;
        Ok(LedgerTransaction {
            id: wtx.id(),
            inputs: self.inputs.clone(),
            outputs: wtx.outputs,
            commands: wtx.commands,
            notary: wtx.notary,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
