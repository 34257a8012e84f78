//! # Responder
//!
//! The counterparty side of every initiating flow:
//!
//! ```text
//! AwaitIdentitySync -> AwaitProposal -> Verify -> CounterSign -> AwaitFinality -> Done
//! ```
//!
//! Settlement starts at `AwaitIdentitySync` because its transactions carry
//! the borrower's confidential change keys. Issue and transfer start at
//! `AwaitProposal`.
//!
//! A proposal that fails verification or the node's [`ProposalCheck`] is
//! answered with `Rejected` and the flow fails without signing.

use std::fmt;
use std::sync::Arc;

use iou_protocol::{PublicKey, SignedTransaction};

use super::context::FlowContext;
use super::error::FlowError;
use super::finality::receive_finality;
use super::identity_sync::receive_identities;
use super::message::FlowKind;
use super::signatures::{countersign, receive_proposal, reject, verify_proposal, Proposal, ProposalCheck};
use crate::services::FlowSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderStep {
    AwaitIdentitySync,
    AwaitProposal,
    Verify,
    CounterSign,
    AwaitFinality,
    Done,
    Failed,
}

impl fmt::Display for ResponderStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

enum ResponderState {
    AwaitIdentitySync,
    AwaitProposal,
    Verify(Proposal),
    CounterSign {
        stx: SignedTransaction,
        keys: Vec<PublicKey>,
    },
    AwaitFinality {
        stx: SignedTransaction,
    },
    Done(SignedTransaction),
}

impl ResponderState {
    fn step(&self) -> ResponderStep {
        match self {
            ResponderState::AwaitIdentitySync => ResponderStep::AwaitIdentitySync,
            ResponderState::AwaitProposal => ResponderStep::AwaitProposal,
            ResponderState::Verify(_) => ResponderStep::Verify,
            ResponderState::CounterSign { .. } => ResponderStep::CounterSign,
            ResponderState::AwaitFinality { .. } => ResponderStep::AwaitFinality,
            ResponderState::Done(_) => ResponderStep::Done,
        }
    }
}

pub struct Responder {
    ctx: FlowContext,
    session: FlowSession,
    kind: FlowKind,
    check: Arc<dyn ProposalCheck>,
}

impl Responder {
    pub fn new(
        ctx: FlowContext,
        session: FlowSession,
        kind: FlowKind,
        check: Arc<dyn ProposalCheck>,
    ) -> Self {
        Self {
            ctx,
            session,
            kind,
            check,
        }
    }

    pub async fn run(mut self) -> Result<SignedTransaction, FlowError> {
        let counterparty = self.session.counterparty().clone();
        tracing::info!(
            node = %self.ctx.identity,
            %counterparty,
            flow = %self.kind,
            "responder started"
        );

        let mut state = match self.kind {
            FlowKind::Settle => ResponderState::AwaitIdentitySync,
            FlowKind::Issue | FlowKind::Transfer => ResponderState::AwaitProposal,
        };
        loop {
            let step = state.step();
            match self.advance(state).await {
                Ok(ResponderState::Done(stx)) => {
                    tracing::info!(
                        node = %self.ctx.identity,
                        %counterparty,
                        tx_id = %stx.id(),
                        flow = %self.kind,
                        "responder done"
                    );
                    return Ok(stx);
                }
                Ok(next) => {
                    tracing::debug!(
                        %counterparty,
                        from = %step,
                        to = %next.step(),
                        "responder transition"
                    );
                    state = next;
                }
                Err(e) => {
                    tracing::warn!(
                        node = %self.ctx.identity,
                        %counterparty,
                        %step,
                        to = %ResponderStep::Failed,
                        error = %e,
                        "responder failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn advance(&mut self, state: ResponderState) -> Result<ResponderState, FlowError> {
        match state {
            ResponderState::AwaitIdentitySync => {
                let learned = receive_identities(&self.ctx, &mut self.session).await?;
                tracing::debug!(learned, "identities received");
                Ok(ResponderState::AwaitProposal)
            }

            ResponderState::AwaitProposal => {
                let proposal = receive_proposal(&mut self.session).await?;
                Ok(ResponderState::Verify(proposal))
            }

            ResponderState::Verify(proposal) => {
                let initiator = self.session.counterparty().clone();
                match verify_proposal(&self.ctx, &initiator, &proposal, self.check.as_ref()) {
                    Ok(keys) => Ok(ResponderState::CounterSign {
                        stx: proposal.stx,
                        keys,
                    }),
                    Err(e) => {
                        reject(&mut self.session, &e).await;
                        Err(e)
                    }
                }
            }

            ResponderState::CounterSign { stx, keys } => {
                countersign(&self.ctx, &mut self.session, &stx, &keys).await?;
                Ok(ResponderState::AwaitFinality { stx })
            }

            ResponderState::AwaitFinality { stx } => {
                let finalised = receive_finality(&self.ctx, &mut self.session, stx.id()).await?;
                Ok(ResponderState::Done(finalised))
            }

            ResponderState::Done(stx) => Ok(ResponderState::Done(stx)),
        }
    }
}
