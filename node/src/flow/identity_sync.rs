//! Identity sync.
//!
//! Before asking a counterparty to sign, the initiator makes sure it can name
//! every confidential key in the transaction that belongs to the initiator.
//!
//! ```text
//! offer(keys) -> request(unknown) -> certificates -> ack
//! ```
//!
//! The responder only accepts certificates for keys it asked about, and only
//! when they name the session's counterparty.

use std::collections::BTreeSet;

use iou_protocol::{PublicKey, WireTransaction};

use super::context::FlowContext;
use super::error::FlowError;
use super::message::FlowMessage;
use crate::services::FlowSession;

/// Confidential keys of ours that appear in `wtx`.
fn confidential_keys(ctx: &FlowContext, wtx: &WireTransaction) -> Vec<PublicKey> {
    let mut keys = BTreeSet::new();
    for command in &wtx.commands {
        keys.extend(command.signers.iter().cloned());
    }
    for output in &wtx.outputs {
        keys.extend(output.data.participants());
    }
    keys.into_iter()
        .filter(|k| *k != ctx.identity.owning_key && ctx.keys.owns(k))
        .collect()
}

/// Active side.
pub async fn send_identities(
    ctx: &FlowContext,
    session: &mut FlowSession,
    wtx: &WireTransaction,
) -> Result<(), FlowError> {
    let offered = confidential_keys(ctx, wtx);
    session
        .send(&FlowMessage::IdentityOffer {
            keys: offered.clone(),
        })
        .await?;

    let requested = match session.receive().await? {
        FlowMessage::IdentityRequest { keys } => keys,
        other => return Err(session.unexpected("IdentityRequest", &other).into()),
    };
    let mut certs = Vec::with_capacity(requested.len());
    for key in &requested {
        if !offered.contains(key) {
            return Err(FlowError::IdentitySync(format!(
                "{} asked for key {} that was not offered",
                session.counterparty(),
                key.short()
            )));
        }
        certs.push(ctx.keys.certify(key)?);
    }
    session
        .send(&FlowMessage::IdentityCertificates { certs })
        .await?;

    match session.receive().await? {
        FlowMessage::IdentityAck => {}
        other => return Err(session.unexpected("IdentityAck", &other).into()),
    }
    tracing::debug!(
        counterparty = %session.counterparty(),
        offered = offered.len(),
        requested = requested.len(),
        "identities sent"
    );
    Ok(())
}

/// Passive side. Returns the number of identities learned.
pub async fn receive_identities(
    ctx: &FlowContext,
    session: &mut FlowSession,
) -> Result<usize, FlowError> {
    let offered = match session.receive().await? {
        FlowMessage::IdentityOffer { keys } => keys,
        other => return Err(session.unexpected("IdentityOffer", &other).into()),
    };
    let unknown: Vec<PublicKey> = offered
        .into_iter()
        .filter(|k| !ctx.identities.knows_key(k))
        .collect();
    session
        .send(&FlowMessage::IdentityRequest {
            keys: unknown.clone(),
        })
        .await?;

    let certs = match session.receive().await? {
        FlowMessage::IdentityCertificates { certs } => certs,
        other => return Err(session.unexpected("IdentityCertificates", &other).into()),
    };
    for cert in &certs {
        if !unknown.contains(&cert.anonymous_key) {
            return Err(FlowError::IdentitySync(format!(
                "unsolicited certificate for {}",
                cert.anonymous_key.short()
            )));
        }
        if cert.party.owning_key != session.counterparty().owning_key {
            return Err(FlowError::IdentitySync(format!(
                "certificate names {} but the session is with {}",
                cert.party,
                session.counterparty()
            )));
        }
    }
    for cert in certs.iter().cloned() {
        ctx.identities
            .register_certificate(cert)
            .map_err(|e| FlowError::IdentitySync(e.to_string()))?;
    }
    session.send(&FlowMessage::IdentityAck).await?;
    Ok(certs.len())
}
