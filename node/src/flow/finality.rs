//! Finality: notarise, record, distribute.
//!
//! The initiator notarises when the transaction consumes inputs, checks that
//! every required signature is now present, records the transaction and
//! sends it to each counterparty. It is done once every counterparty has
//! acknowledged recording it.

use futures::future::join_all;

use iou_protocol::{SecureHash, SignedTransaction};

use super::context::FlowContext;
use super::error::FlowError;
use super::message::FlowMessage;
use crate::services::FlowSession;

pub async fn finalise(
    ctx: &FlowContext,
    stx: SignedTransaction,
    sessions: &mut [FlowSession],
) -> Result<SignedTransaction, FlowError> {
    let notary_key = ctx.notary.identity().owning_key.clone();
    stx.verify_signatures_except(std::slice::from_ref(&notary_key))?;

    let stx = if stx.tx.inputs.is_empty() {
        stx
    } else {
        let sig = ctx.notary.notarise(&stx).await?;
        stx.with_signature(sig)
    };
    stx.verify_required_signatures()?;
    ctx.record_transaction(&stx);

    let tx_id = stx.id();
    for session in sessions.iter() {
        session
            .send(&FlowMessage::Finalised { stx: stx.clone() })
            .await?;
    }
    let acks = join_all(sessions.iter_mut().map(|session| await_ack(session, tx_id))).await;
    acks.into_iter().collect::<Result<Vec<()>, FlowError>>()?;

    tracing::info!(tx_id = %tx_id, counterparties = sessions.len(), "transaction finalised");
    Ok(stx)
}

async fn await_ack(session: &mut FlowSession, tx_id: SecureHash) -> Result<(), FlowError> {
    match session.receive().await? {
        FlowMessage::FinalityAck { tx_id: acked } if acked == tx_id => Ok(()),
        FlowMessage::FinalityAck { tx_id: acked } => Err(FlowError::InvalidRequest(format!(
            "{} acknowledged {} instead of {}",
            session.counterparty(),
            acked,
            tx_id
        ))),
        other => Err(session.unexpected("FinalityAck", &other).into()),
    }
}

/// Counterparty side: accept the finished transaction we signed.
pub async fn receive_finality(
    ctx: &FlowContext,
    session: &mut FlowSession,
    expected: SecureHash,
) -> Result<SignedTransaction, FlowError> {
    let stx = match session.receive().await? {
        FlowMessage::Finalised { stx } => stx,
        other => return Err(session.unexpected("Finalised", &other).into()),
    };
    if stx.id() != expected {
        return Err(FlowError::InvalidRequest(format!(
            "expected finalised {} but received {}",
            expected,
            stx.id()
        )));
    }
    stx.verify_required_signatures()?;
    ctx.record_transaction(&stx);
    session
        .send(&FlowMessage::FinalityAck { tx_id: expected })
        .await?;
    Ok(stx)
}
