//! Signature collection.
//!
//! The initiator ships a partially signed transaction together with the
//! transactions that created its inputs. The counterparty checks the
//! dependencies, the signatures already present, and the contracts, then runs
//! its own [`ProposalCheck`] before signing with every required key it holds.
//! Any failure on the counterparty's side comes back as `Rejected` with the
//! verbatim reason.

use std::collections::BTreeSet;

use iou_contracts::verify_transaction;
use iou_protocol::{
    LedgerTransaction, Party, PublicKey, ResolutionError, SecureHash, SignatureError,
    SignedTransaction, TransactionSignature,
};

use super::context::FlowContext;
use super::error::FlowError;
use super::message::FlowMessage;
use crate::services::{FlowSession, WithDependencies};

// ---------------------------------------------------------------------------
// Acceptance checks
// ---------------------------------------------------------------------------

/// Counterparty-specific acceptance rule applied after the contracts pass.
pub trait ProposalCheck: Send + Sync {
    /// `Err(reason)` refuses to sign.
    fn check(
        &self,
        ctx: &FlowContext,
        stx: &SignedTransaction,
        ltx: &LedgerTransaction,
    ) -> Result<(), String>;
}

/// Signs anything the contracts accept.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ProposalCheck for AcceptAll {
    fn check(&self, _: &FlowContext, _: &SignedTransaction, _: &LedgerTransaction) -> Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Initiator
// ---------------------------------------------------------------------------

/// The committed transactions that produced `stx`'s inputs.
pub fn dependencies_of(
    ctx: &FlowContext,
    stx: &SignedTransaction,
) -> Result<Vec<SignedTransaction>, FlowError> {
    let ids: BTreeSet<SecureHash> = stx.tx.inputs.iter().map(|r| r.txhash).collect();
    ids.into_iter()
        .map(|id| {
            ctx.vault
                .transaction(&id)
                .ok_or(FlowError::Resolution(ResolutionError::UnknownTransaction(id)))
        })
        .collect()
}

/// Send `stx` for signing and wait for the counterparty's signatures.
pub async fn collect_signatures(
    ctx: &FlowContext,
    session: &mut FlowSession,
    stx: &SignedTransaction,
) -> Result<Vec<TransactionSignature>, FlowError> {
    let dependencies = dependencies_of(ctx, stx)?;
    session
        .send(&FlowMessage::SignatureProposal {
            stx: stx.clone(),
            dependencies,
        })
        .await?;

    let sigs = match session.receive().await? {
        FlowMessage::Signatures { sigs } => sigs,
        FlowMessage::Rejected { reason } => {
            tracing::warn!(
                tx_id = %stx.id(),
                counterparty = %session.counterparty(),
                %reason,
                "counterparty rejected transaction"
            );
            return Err(FlowError::CounterpartyRejected {
                counterparty: session.counterparty().name.clone(),
                reason,
            });
        }
        other => return Err(session.unexpected("Signatures", &other).into()),
    };

    let tx_id = stx.id();
    let required = stx.required_signing_keys();
    for sig in &sigs {
        if !required.contains(&sig.by) {
            return Err(FlowError::InvalidRequest(format!(
                "{} returned a signature by {} which is not a required signer",
                session.counterparty(),
                sig.by.short()
            )));
        }
        if !sig.verify(&tx_id) {
            return Err(FlowError::Signature(SignatureError::Invalid {
                key: sig.by.clone(),
                tx_id,
            }));
        }
    }
    Ok(sigs)
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

/// A proposal as received, before verification.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub stx: SignedTransaction,
    pub dependencies: Vec<SignedTransaction>,
}

pub async fn receive_proposal(session: &mut FlowSession) -> Result<Proposal, FlowError> {
    match session.receive().await? {
        FlowMessage::SignatureProposal { stx, dependencies } => Ok(Proposal { stx, dependencies }),
        other => Err(session.unexpected("SignatureProposal", &other).into()),
    }
}

/// Everything a counterparty checks before signing.
///
/// 1. Each dependency is fully signed and produced one of the inputs.
/// 2. Signatures present are valid and the initiator has signed. Other
///    signers may still be missing: multi-party flows collect one
///    counterparty at a time.
/// 3. Inputs resolve through the dependencies or the local vault.
/// 4. The contracts accept the transaction.
/// 5. `check` accepts it.
/// 6. We hold at least one required key.
pub fn verify_proposal(
    ctx: &FlowContext,
    initiator: &Party,
    proposal: &Proposal,
    check: &dyn ProposalCheck,
) -> Result<Vec<PublicKey>, FlowError> {
    let stx = &proposal.stx;
    let input_txs: BTreeSet<SecureHash> = stx.tx.inputs.iter().map(|r| r.txhash).collect();
    for dep in &proposal.dependencies {
        if !input_txs.contains(&dep.id()) {
            return Err(FlowError::InvalidDependency(format!(
                "{} does not produce any input of {}",
                dep.id(),
                stx.id()
            )));
        }
        dep.verify_required_signatures()
            .map_err(|e| FlowError::InvalidDependency(e.to_string()))?;
    }

    let ours = ctx.keys.filter_owned(stx.required_signing_keys().iter());
    let not_yet_signed: Vec<PublicKey> = stx.missing_signers().into_iter().collect();
    stx.verify_signatures_except(&not_yet_signed)?;
    if not_yet_signed.contains(&initiator.owning_key) {
        return Err(FlowError::Signature(SignatureError::Missing {
            tx_id: stx.id(),
            missing: vec![initiator.owning_key.clone()],
        }));
    }

    let resolver = WithDependencies {
        dependencies: &proposal.dependencies,
        vault: &ctx.vault,
    };
    let ltx = stx.to_ledger_transaction(&resolver)?;
    verify_transaction(&ltx)?;
    check.check(ctx, stx, &ltx).map_err(FlowError::ProposalRefused)?;

    if ours.is_empty() {
        return Err(FlowError::InvalidRequest(format!(
            "{} is not a required signer of {}",
            ctx.identity,
            stx.id()
        )));
    }
    Ok(ours)
}

/// Sign with `keys` and send the signatures back.
pub async fn countersign(
    ctx: &FlowContext,
    session: &mut FlowSession,
    stx: &SignedTransaction,
    keys: &[PublicKey],
) -> Result<(), FlowError> {
    let tx_id = stx.id();
    let sigs = keys
        .iter()
        .map(|k| ctx.keys.sign(&tx_id, k))
        .collect::<Result<Vec<_>, _>>()?;
    session.send(&FlowMessage::Signatures { sigs }).await?;
    tracing::debug!(tx_id = %tx_id, counterparty = %session.counterparty(), "countersigned");
    Ok(())
}

/// Tell the initiator why we won't sign. Send failures are ignored: the
/// flow is failing anyway.
pub async fn reject(session: &mut FlowSession, error: &FlowError) {
    tracing::warn!(counterparty = %session.counterparty(), %error, "rejecting proposal");
    let _ = session
        .send(&FlowMessage::Rejected {
            reason: error.to_string(),
        })
        .await;
}
