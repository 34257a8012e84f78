//! IOU issuance. Either party may start it; the other countersigns.

use iou_contracts::verify_transaction;
use iou_protocol::{IouCommand, IouState, SignedTransaction, TransactionBuilder};

use super::context::FlowContext;
use super::error::FlowError;
use super::finality::finalise;
use super::message::FlowKind;
use super::signatures::collect_signatures;

pub async fn issue_iou(ctx: &FlowContext, iou: IouState) -> Result<SignedTransaction, FlowError> {
    let me = &ctx.identity.owning_key;
    let counterparty = if iou.lender.owning_key == *me {
        iou.borrower.clone()
    } else if iou.borrower.owning_key == *me {
        iou.lender.clone()
    } else {
        return Err(FlowError::UnauthorizedInitiator {
            initiator: ctx.identity.name.clone(),
            role: "lender or borrower",
        });
    };
    tracing::info!(
        node = %ctx.identity,
        linear_id = %iou.linear_id,
        amount = %iou.amount,
        %counterparty,
        "issue started"
    );

    let mut builder = TransactionBuilder::new(ctx.notary_party());
    builder
        .add_output_state(iou.clone())
        .add_command(IouCommand::Issue, iou.participants());
    verify_transaction(&builder.to_ledger_transaction()?)?;
    let stx = ctx
        .keys
        .sign_transaction(builder.to_wire_transaction()?, std::slice::from_ref(me))?;

    let mut session = ctx
        .messaging
        .initiate_session(&ctx.identity, &counterparty, FlowKind::Issue)
        .await?;
    let sigs = collect_signatures(ctx, &mut session, &stx).await?;
    let stx = finalise(ctx, stx.with_signatures(sigs), std::slice::from_mut(&mut session)).await?;

    tracing::info!(linear_id = %iou.linear_id, tx_id = %stx.id(), "issue done");
    Ok(stx)
}
