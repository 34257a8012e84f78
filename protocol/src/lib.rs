// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # IOU Ledger — Protocol Library
//!
//! The shared vocabulary of the IOU ledger: every node, every contract and
//! every settlement protocol speaks in the types defined here.
//!
//! ## Architecture
//!
//! - **config** — Protocol constants and defaults.
//! - **crypto** — Ed25519 keys and SHA-256 hashes. Thin wrappers, nothing clever.
//! - **identity** — Well-known parties, confidential (anonymous) parties and
//!   the certificates that bind the two.
//! - **state** — The ledger states: the IOU itself and the cash used to pay it.
//! - **transaction** — Commands, the transaction builder, wire / ledger /
//!   signed transactions and signature verification.
//!
//! Contract logic lives in `iou-contracts`; anything that does I/O lives in
//! `iou-node`. This crate is pure data plus the rules for hashing and signing it.
//!
//! ## Design Philosophy
//!
//! 1. States are immutable values. A transition consumes old versions and
//!    produces new ones; nothing is edited in place.
//! 2. Money is integers in the smallest unit, and every sum is checked.
//! 3. Transaction ids are derived from content, so signing never changes them.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod state;
pub mod transaction;

pub use crypto::{Keypair, PublicKey, SecureHash, Signature};
pub use identity::{AbstractParty, AnonymousParty, IdentityCertificate, Party};
pub use state::{
    CashState, ContractState, IouState, PartyAndReference, StateAndRef, StateRef,
    TransactionState, UniqueIdentifier,
};
pub use transaction::{
    Amount, AmountError, CashCommand, Command, CommandData, Currency, IouCommand,
    LedgerTransaction, ResolutionError, SignatureError, SignedTransaction, StateResolver,
    TransactionBuilder, TransactionError, TransactionSignature, WireTransaction,
};
