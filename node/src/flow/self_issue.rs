//! Cash self-issuance, for bootstrapping balances in demos and tests.

use iou_contracts::verify_transaction;
use iou_protocol::config::DEFAULT_ISSUER_REF;
use iou_protocol::{Amount, CashCommand, CashState, PartyAndReference, TransactionBuilder};

use super::context::FlowContext;
use super::error::FlowError;
use super::finality::finalise;

/// Issue `amount` to ourselves, with ourselves as issuer.
pub async fn self_issue_cash(ctx: &FlowContext, amount: Amount) -> Result<CashState, FlowError> {
    let me = ctx.identity.clone();
    let cash = CashState::new(
        amount,
        me.clone(),
        PartyAndReference::new(me.clone(), DEFAULT_ISSUER_REF),
    );

    let mut builder = TransactionBuilder::new(ctx.notary_party());
    builder
        .add_output_state(cash.clone())
        .add_command(CashCommand::Issue, vec![me.owning_key.clone()]);
    verify_transaction(&builder.to_ledger_transaction()?)?;
    let stx = ctx
        .keys
        .sign_transaction(builder.to_wire_transaction()?, &[me.owning_key.clone()])?;
    let stx = finalise(ctx, stx, &mut []).await?;

    tracing::info!(node = %me, amount = %cash.amount, tx_id = %stx.id(), "cash self-issued");
    Ok(cash)
}
