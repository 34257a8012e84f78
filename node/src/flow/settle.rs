//! # Settlement (initiator)
//!
//! The borrower pays some or all of an IOU's outstanding amount in cash.
//!
//! The flow is an explicit state machine. Each state owns exactly the data
//! the next step needs, and [`SettleFlow::run`] advances one step at a time:
//!
//! ```text
//! Lookup -> AuthorizationCheck -> BalanceCheck -> BuildTransition
//!        -> LocalSign -> IdentitySync -> CollectCounterSignature
//!        -> Commit -> Done
//! ```
//!
//! Any step may fail, which ends the flow in `Failed`. Steps that talk to the
//! lender suspend on the session. No vault lock is held while suspended;
//! only the cash selected for the spend is soft-locked, and that lock is
//! released however the flow ends.

use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use iou_contracts::verify_transaction;
use iou_protocol::{
    Amount, IouCommand, PublicKey, SignedTransaction, StateAndRef, TransactionBuilder,
    UniqueIdentifier,
};

use super::context::FlowContext;
use super::error::FlowError;
use super::finality::finalise;
use super::identity_sync::send_identities;
use super::message::FlowKind;
use super::signatures::collect_signatures;
use crate::services::{generate_spend, FlowSession};

/// Where a settlement is, for logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStep {
    Lookup,
    AuthorizationCheck,
    BalanceCheck,
    BuildTransition,
    LocalSign,
    IdentitySync,
    CollectCounterSignature,
    Commit,
    Done,
    Failed,
}

impl fmt::Display for SettleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

enum SettleState {
    Lookup,
    AuthorizationCheck {
        iou: StateAndRef,
    },
    BalanceCheck {
        iou: StateAndRef,
    },
    BuildTransition {
        iou: StateAndRef,
    },
    LocalSign {
        builder: TransactionBuilder,
        signing_keys: Vec<PublicKey>,
    },
    IdentitySync {
        stx: SignedTransaction,
        lender: iou_protocol::Party,
    },
    CollectCounterSignature {
        stx: SignedTransaction,
        session: FlowSession,
    },
    Commit {
        stx: SignedTransaction,
        session: FlowSession,
    },
    Done(SignedTransaction),
}

impl SettleState {
    fn step(&self) -> SettleStep {
        match self {
            SettleState::Lookup => SettleStep::Lookup,
            SettleState::AuthorizationCheck { .. } => SettleStep::AuthorizationCheck,
            SettleState::BalanceCheck { .. } => SettleStep::BalanceCheck,
            SettleState::BuildTransition { .. } => SettleStep::BuildTransition,
            SettleState::LocalSign { .. } => SettleStep::LocalSign,
            SettleState::IdentitySync { .. } => SettleStep::IdentitySync,
            SettleState::CollectCounterSignature { .. } => SettleStep::CollectCounterSignature,
            SettleState::Commit { .. } => SettleStep::Commit,
            SettleState::Done(_) => SettleStep::Done,
        }
    }
}

/// One settlement attempt.
pub struct SettleFlow<'a> {
    ctx: &'a FlowContext,
    linear_id: UniqueIdentifier,
    amount: Amount,
    lock_id: Uuid,
}

impl<'a> SettleFlow<'a> {
    pub fn new(ctx: &'a FlowContext, linear_id: UniqueIdentifier, amount: Amount) -> Self {
        Self {
            ctx,
            linear_id,
            amount,
            lock_id: Uuid::new_v4(),
        }
    }

    /// Drive the flow to `Done` or `Failed`.
    pub async fn run(self) -> Result<SignedTransaction, FlowError> {
        let started = Instant::now();
        tracing::info!(
            node = %self.ctx.identity,
            linear_id = %self.linear_id,
            amount = %self.amount,
            "settlement started"
        );

        let mut state = SettleState::Lookup;
        let outcome = loop {
            let step = state.step();
            match self.advance(state).await {
                Ok(SettleState::Done(stx)) => break Ok(stx),
                Ok(next) => {
                    tracing::debug!(
                        linear_id = %self.linear_id,
                        from = %step,
                        to = %next.step(),
                        "settle transition"
                    );
                    state = next;
                }
                Err(e) => {
                    tracing::debug!(
                        linear_id = %self.linear_id,
                        from = %step,
                        to = %SettleStep::Failed,
                        "settle transition"
                    );
                    break Err((step, e));
                }
            }
        };

        let released = self.ctx.vault.soft_lock_release(self.lock_id);
        match outcome {
            Ok(stx) => {
                tracing::info!(
                    linear_id = %self.linear_id,
                    tx_id = %stx.id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "settlement done"
                );
                Ok(stx)
            }
            Err((step, e)) => {
                tracing::warn!(
                    linear_id = %self.linear_id,
                    %step,
                    released,
                    error = %e,
                    "settlement failed"
                );
                Err(e)
            }
        }
    }

    async fn advance(&self, state: SettleState) -> Result<SettleState, FlowError> {
        let ctx = self.ctx;
        match state {
            SettleState::Lookup => {
                let iou = ctx
                    .vault
                    .query_iou_by_linear_id(&self.linear_id)
                    .ok_or_else(|| FlowError::NotFound(self.linear_id.clone()))?;
                Ok(SettleState::AuthorizationCheck { iou })
            }

            SettleState::AuthorizationCheck { iou } => {
                let borrower = &iou_of(&iou)?.borrower;
                if borrower.owning_key != ctx.identity.owning_key {
                    return Err(FlowError::UnauthorizedInitiator {
                        initiator: ctx.identity.name.clone(),
                        role: "borrower",
                    });
                }
                Ok(SettleState::BalanceCheck { iou })
            }

            SettleState::BalanceCheck { iou } => {
                let state = iou_of(&iou)?;
                if state.amount.currency != self.amount.currency {
                    return Err(FlowError::CurrencyMismatch {
                        expected: state.amount.currency.clone(),
                        found: self.amount.currency.clone(),
                    });
                }
                let balance = ctx
                    .vault
                    .spendable_balance(&self.amount.currency, self.lock_id)?;
                if balance.quantity < self.amount.quantity {
                    return Err(FlowError::InsufficientFunds {
                        requested: self.amount.clone(),
                        available: balance,
                    });
                }
                let outstanding = state.outstanding()?;
                if self.amount.quantity > outstanding.quantity {
                    return Err(FlowError::OverSettlement {
                        requested: self.amount.clone(),
                        outstanding,
                    });
                }
                Ok(SettleState::BuildTransition { iou })
            }

            SettleState::BuildTransition { iou } => {
                let state = iou_of(&iou)?.clone();
                let mut builder = TransactionBuilder::new(iou.state.notary.clone());
                let cash_keys = generate_spend(
                    &ctx.vault,
                    &ctx.keys,
                    &mut builder,
                    &self.amount,
                    &state.lender,
                    self.lock_id,
                )?;
                builder
                    .add_input_state(iou)
                    .add_command(IouCommand::Settle, state.participants());

                let remaining = state.outstanding()?.checked_sub(&self.amount)?;
                if !remaining.is_zero() {
                    builder.add_output_state(state.pay(&self.amount)?);
                }

                let mut signing_keys = cash_keys;
                if !signing_keys.contains(&ctx.identity.owning_key) {
                    signing_keys.push(ctx.identity.owning_key.clone());
                }
                Ok(SettleState::LocalSign {
                    builder,
                    signing_keys,
                })
            }

            SettleState::LocalSign {
                builder,
                signing_keys,
            } => {
                let ltx = builder.to_ledger_transaction()?;
                verify_transaction(&ltx)?;
                let lender = ltx
                    .iou_inputs()
                    .first()
                    .map(|iou| iou.lender.clone())
                    .ok_or_else(|| FlowError::InvalidRequest("settlement has no IOU input".into()))?;
                let stx = ctx
                    .keys
                    .sign_transaction(builder.to_wire_transaction()?, &signing_keys)?;
                Ok(SettleState::IdentitySync { stx, lender })
            }

            SettleState::IdentitySync { stx, lender } => {
                let mut session = ctx
                    .messaging
                    .initiate_session(&ctx.identity, &lender, FlowKind::Settle)
                    .await?;
                send_identities(ctx, &mut session, &stx.tx).await?;
                Ok(SettleState::CollectCounterSignature { stx, session })
            }

            SettleState::CollectCounterSignature { stx, mut session } => {
                let sigs = collect_signatures(ctx, &mut session, &stx).await?;
                Ok(SettleState::Commit {
                    stx: stx.with_signatures(sigs),
                    session,
                })
            }

            SettleState::Commit { stx, mut session } => {
                let stx = finalise(ctx, stx, std::slice::from_mut(&mut session)).await?;
                Ok(SettleState::Done(stx))
            }

            SettleState::Done(stx) => Ok(SettleState::Done(stx)),
        }
    }
}

fn iou_of(iou: &StateAndRef) -> Result<&iou_protocol::IouState, FlowError> {
    iou.iou()
        .ok_or_else(|| FlowError::InvalidRequest(format!("{} is not an IOU", iou.reference)))
}
