//! IOU transfer: the current lender hands the claim to a new lender.
//!
//! Borrower, old lender and new lender all sign. The old lender collects the
//! other two signatures over separate sessions and finalises to both.

use std::collections::BTreeSet;

use iou_contracts::verify_transaction;
use iou_protocol::{IouCommand, Party, PublicKey, SignedTransaction, TransactionBuilder, UniqueIdentifier};

use super::context::FlowContext;
use super::error::FlowError;
use super::finality::finalise;
use super::message::FlowKind;
use super::signatures::collect_signatures;

pub async fn transfer_iou(
    ctx: &FlowContext,
    linear_id: UniqueIdentifier,
    new_lender: Party,
) -> Result<SignedTransaction, FlowError> {
    let input = ctx
        .vault
        .query_iou_by_linear_id(&linear_id)
        .ok_or_else(|| FlowError::NotFound(linear_id.clone()))?;
    let iou = input
        .iou()
        .cloned()
        .ok_or_else(|| FlowError::NotFound(linear_id.clone()))?;
    if iou.lender.owning_key != ctx.identity.owning_key {
        return Err(FlowError::UnauthorizedInitiator {
            initiator: ctx.identity.name.clone(),
            role: "lender",
        });
    }
    tracing::info!(
        node = %ctx.identity,
        %linear_id,
        new_lender = %new_lender,
        "transfer started"
    );

    let output = iou.with_new_lender(new_lender.clone());
    let signers: BTreeSet<PublicKey> = iou
        .participants()
        .into_iter()
        .chain(output.participants())
        .collect();

    let mut builder = TransactionBuilder::new(input.state.notary.clone());
    builder
        .add_input_state(input)
        .add_output_state(output)
        .add_command(IouCommand::Transfer, signers.into_iter().collect());
    verify_transaction(&builder.to_ledger_transaction()?)?;
    let mut stx = ctx.keys.sign_transaction(
        builder.to_wire_transaction()?,
        std::slice::from_ref(&ctx.identity.owning_key),
    )?;

    let mut sessions = Vec::with_capacity(2);
    for counterparty in [&iou.borrower, &new_lender] {
        sessions.push(
            ctx.messaging
                .initiate_session(&ctx.identity, counterparty, FlowKind::Transfer)
                .await?,
        );
    }
    for session in sessions.iter_mut() {
        let sigs = collect_signatures(ctx, session, &stx).await?;
        stx = stx.with_signatures(sigs);
    }
    let stx = finalise(ctx, stx, &mut sessions).await?;

    tracing::info!(%linear_id, tx_id = %stx.id(), "transfer done");
    Ok(stx)
}
