//! Flow errors.
//!
//! Any error aborts the whole flow. Contract violations are carried intact so
//! the caller sees exactly which rule refused the transaction.

use thiserror::Error;

use iou_contracts::ContractError;
use iou_protocol::{
    Amount, AmountError, Currency, ResolutionError, SecureHash, SignatureError, StateRef,
    TransactionError, UniqueIdentifier,
};

use crate::services::{KeyServiceError, NotaryError, SessionError, SpendError, VaultError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlowError {
    /// No unconsumed IOU with that linear id in the vault.
    #[error("no unconsumed IOU with linear id {0}")]
    NotFound(UniqueIdentifier),

    #[error("{initiator} may not start this flow: only the {role} can")]
    UnauthorizedInitiator {
        initiator: String,
        role: &'static str,
    },

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Amount, available: Amount },

    #[error("settlement of {requested} exceeds the outstanding {outstanding}")]
    OverSettlement {
        requested: Amount,
        outstanding: Amount,
    },

    #[error("settlement currency {found} does not match IOU currency {expected}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("{counterparty} rejected the transaction: {reason}")]
    CounterpartyRejected {
        counterparty: String,
        reason: String,
    },

    /// The local acceptance check refused a proposal.
    #[error("proposal refused: {0}")]
    ProposalRefused(String),

    /// The notary found an input already consumed.
    #[error("commit conflict: state {state} already consumed by {consumed_by}")]
    CommitConflict {
        state: StateRef,
        consumed_by: SecureHash,
    },

    #[error("notary: {0}")]
    Notary(NotaryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Keys(#[from] KeyServiceError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("cash spend: {0}")]
    Spend(SpendError),

    #[error("identity sync: {0}")]
    IdentitySync(String),

    #[error("invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("unknown party {0}")]
    UnknownParty(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<NotaryError> for FlowError {
    fn from(e: NotaryError) -> Self {
        match e {
            NotaryError::Conflict { state, consumed_by } => {
                FlowError::CommitConflict { state, consumed_by }
            }
            other => FlowError::Notary(other),
        }
    }
}

impl From<SpendError> for FlowError {
    fn from(e: SpendError) -> Self {
        match e {
            SpendError::InsufficientBalance {
                requested,
                available,
            } => FlowError::InsufficientFunds {
                requested,
                available,
            },
            other => FlowError::Spend(other),
        }
    }
}
