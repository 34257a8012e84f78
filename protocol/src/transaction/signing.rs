//! Transaction signing and signature verification.
//!
//! Every signer signs the 32-byte transaction id. A [`SignedTransaction`]
//! accumulates signatures as it travels between parties: the initiator
//! signs first, counterparties add theirs, the notary signs last.
//!
//! Verification is split so each stage can check what it should:
//! a responder verifies "everything except my key and the notary's", the
//! notary verifies "everything except mine", and anyone recording a
//! finished transaction verifies everything.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use super::ledger::LedgerTransaction;
use super::verification::{resolve, ResolutionError, StateResolver, TransactionError};
use super::wire::WireTransaction;
use crate::crypto::{Keypair, PublicKey, SecureHash, Signature};

/// Signature verification failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// A signature is present but doesn't verify over the transaction id.
    #[error("invalid signature by {key} on transaction {tx_id}")]
    Invalid { key: PublicKey, tx_id: SecureHash },

    /// Required signers that haven't signed yet.
    #[error("transaction {tx_id} is missing signatures from {}", format_keys(.missing))]
    Missing {
        tx_id: SecureHash,
        missing: Vec<PublicKey>,
    },

    /// The transaction content no longer matches its id.
    #[error(transparent)]
    Structure(#[from] TransactionError),
}

fn format_keys(keys: &[PublicKey]) -> String {
    keys.iter()
        .map(|k| k.short())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One signer's signature over a transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub by: PublicKey,
    pub signature: Signature,
}

impl TransactionSignature {
    /// Sign `tx_id` with `keypair`.
    pub fn create(tx_id: &SecureHash, keypair: &Keypair) -> Self {
        Self {
            by: keypair.public_key(),
            signature: keypair.sign(tx_id.as_bytes()),
        }
    }

    pub fn verify(&self, tx_id: &SecureHash) -> bool {
        self.by.verify(tx_id.as_bytes(), &self.signature)
    }
}

/// A wire transaction plus the signatures collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: WireTransaction,
    pub sigs: Vec<TransactionSignature>,
}

impl SignedTransaction {
    pub fn new(tx: WireTransaction, sigs: Vec<TransactionSignature>) -> Self {
        Self { tx, sigs }
    }

    pub fn id(&self) -> SecureHash {
        self.tx.id()
    }

    pub fn required_signing_keys(&self) -> BTreeSet<PublicKey> {
        self.tx.required_signing_keys()
    }

    /// Keys that have contributed a signature.
    pub fn signers(&self) -> BTreeSet<PublicKey> {
        self.sigs.iter().map(|s| s.by.clone()).collect()
    }

    /// Required keys without a signature yet.
    pub fn missing_signers(&self) -> BTreeSet<PublicKey> {
        let signed = self.signers();
        self.required_signing_keys()
            .into_iter()
            .filter(|k| !signed.contains(k))
            .collect()
    }

    /// Add a signature. A second signature by the same key replaces the first.
    pub fn with_signature(mut self, sig: TransactionSignature) -> Self {
        self.sigs.retain(|s| s.by != sig.by);
        self.sigs.push(sig);
        self
    }

    pub fn with_signatures(self, sigs: impl IntoIterator<Item = TransactionSignature>) -> Self {
        sigs.into_iter().fold(self, |stx, sig| stx.with_signature(sig))
    }

    /// Check the id, every present signature, and that every required key
    /// other than `allowed_missing` has signed.
    pub fn verify_signatures_except(
        &self,
        allowed_missing: &[PublicKey],
    ) -> Result<(), SignatureError> {
        self.tx.check_id()?;
        let tx_id = self.id();
        for sig in &self.sigs {
            if !sig.verify(&tx_id) {
                return Err(SignatureError::Invalid {
                    key: sig.by.clone(),
                    tx_id,
                });
            }
        }
        let missing: Vec<PublicKey> = self
            .missing_signers()
            .into_iter()
            .filter(|k| !allowed_missing.contains(k))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SignatureError::Missing { tx_id, missing })
        }
    }

    /// Every required signature is present and valid.
    pub fn verify_required_signatures(&self) -> Result<(), SignatureError> {
        self.verify_signatures_except(&[])
    }

    /// Resolve inputs into a [`LedgerTransaction`] for contract verification.
    pub fn to_ledger_transaction<R: StateResolver + ?Sized>(
        &self,
        resolver: &R,
    ) -> Result<LedgerTransaction, ResolutionError> {
        resolve(&self.tx, resolver)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Party;
    use crate::state::{IouState, StateRef};
    use crate::transaction::builder::TransactionBuilder;
    use crate::transaction::command::IouCommand;
    use crate::transaction::types::{Amount, Currency};

    struct Fixture {
        lender: Keypair,
        borrower: Keypair,
        notary: Keypair,
        wtx: WireTransaction,
    }

    fn issue_fixture() -> Fixture {
        let lender = Keypair::generate();
        let borrower = Keypair::generate();
        let notary = Keypair::generate();
        let iou = IouState::new(
            Amount::new(10_000, Currency::USD),
            Party::new("Lender", lender.public_key()),
            Party::new("Borrower", borrower.public_key()),
        );
        let mut builder = TransactionBuilder::new(Party::new("Notary", notary.public_key()));
        builder.add_output_state(iou.clone());
        builder.add_command(IouCommand::Issue, iou.participants());
        let wtx = builder.to_wire_transaction().unwrap();
        Fixture {
            lender,
            borrower,
            notary,
            wtx,
        }
    }

    #[test]
    fn signing_does_not_change_id() {
        let f = issue_fixture();
        let id_before = f.wtx.id();
        let stx = SignedTransaction::new(f.wtx, vec![])
            .with_signature(TransactionSignature::create(&id_before, &f.lender));
        assert_eq!(stx.id(), id_before);
    }

    #[test]
    fn fully_signed_issue_verifies() {
        let f = issue_fixture();
        let id = f.wtx.id();
        let stx = SignedTransaction::new(f.wtx, vec![]).with_signatures([
            TransactionSignature::create(&id, &f.lender),
            TransactionSignature::create(&id, &f.borrower),
        ]);
        assert!(stx.verify_required_signatures().is_ok());
    }

    #[test]
    fn issue_without_inputs_needs_no_notary_signature() {
        let f = issue_fixture();
        assert!(!f.wtx.required_signing_keys().contains(&f.notary.public_key()));
    }

    #[test]
    fn missing_signature_is_reported_with_key() {
        let f = issue_fixture();
        let id = f.wtx.id();
        let stx = SignedTransaction::new(f.wtx, vec![])
            .with_signature(TransactionSignature::create(&id, &f.borrower));

        match stx.verify_required_signatures() {
            Err(SignatureError::Missing { missing, .. }) => {
                assert_eq!(missing, vec![f.lender.public_key()]);
            }
            other => panic!("expected Missing, got {:?}", other),
        }
        assert!(stx
            .verify_signatures_except(&[f.lender.public_key()])
            .is_ok());
    }

    #[test]
    fn signature_over_other_tx_is_invalid() {
        let f = issue_fixture();
        let other = issue_fixture();
        let forged = TransactionSignature::create(&other.wtx.id(), &f.lender);
        let stx = SignedTransaction::new(f.wtx, vec![forged]);
        match stx.verify_signatures_except(&[f.lender.public_key(), f.borrower.public_key()]) {
            Err(SignatureError::Invalid { key, .. }) => assert_eq!(key, f.lender.public_key()),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn tampered_content_fails_id_check() {
        let f = issue_fixture();
        let id = f.wtx.id();
        let mut stx = SignedTransaction::new(f.wtx, vec![]).with_signatures([
            TransactionSignature::create(&id, &f.lender),
            TransactionSignature::create(&id, &f.borrower),
        ]);
        stx.tx.privacy_salt[0] ^= 0xff;
        match stx.verify_required_signatures() {
            Err(SignatureError::Structure(TransactionError::IdMismatch { .. })) => {}
            other => panic!("expected IdMismatch, got {:?}", other),
        }
    }

    #[test]
    fn resigning_replaces_previous_signature() {
        let f = issue_fixture();
        let id = f.wtx.id();
        let stx = SignedTransaction::new(f.wtx, vec![])
            .with_signature(TransactionSignature::create(&id, &f.lender))
            .with_signature(TransactionSignature::create(&id, &f.lender));
        assert_eq!(stx.sigs.len(), 1);
    }

    #[test]
    fn resolution_of_unknown_input_fails() {
        let f = issue_fixture();
        let issue_id = f.wtx.id();
        let issued = SignedTransaction::new(f.wtx, vec![]);
        let iou_ref = issued.tx.out_ref(0).unwrap();

        let mut builder = TransactionBuilder::new(iou_ref.state.notary.clone());
        builder.add_input_state(iou_ref.clone());
        builder.add_command(IouCommand::Settle, vec![f.borrower.public_key()]);
        let settle = SignedTransaction::new(builder.to_wire_transaction().unwrap(), vec![]);

        let deps: Vec<SignedTransaction> = vec![];
        assert_eq!(
            settle.to_ledger_transaction(&deps),
            Err(ResolutionError::UnknownTransaction(issue_id))
        );

        let ltx = settle.to_ledger_transaction(&vec![issued]).unwrap();
        assert_eq!(ltx.inputs[0].reference, StateRef::new(issue_id, 0));
        assert!(settle.required_signing_keys().contains(&f.notary.public_key()));
    }
}
