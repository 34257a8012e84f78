//! # Transaction Module
//!
//! Construction, signing and verification of ledger transactions.
//!
//! ## Architecture
//!
//! ```text
//! types.rs        — Amount and Currency
//! command.rs      — IOU and cash intents, commands with signer lists
//! builder.rs      — TransactionBuilder: incremental construction
//! wire.rs         — WireTransaction: inputs by reference, content-derived id
//! ledger.rs       — LedgerTransaction: inputs resolved, what contracts verify
//! signing.rs      — SignedTransaction: signature collection and checks
//! verification.rs — structural checks and input resolution
//! ```
//!
//! ## Transaction Lifecycle
//!
//! 1. **Build** — add inputs, outputs and commands to a [`TransactionBuilder`].
//! 2. **Verify** — run the contracts over the builder's [`LedgerTransaction`].
//! 3. **Sign** — freeze to a [`WireTransaction`]; each signer signs its id.
//! 4. **Collect** — counterparties add signatures to the [`SignedTransaction`].
//! 5. **Notarise** — the notary checks for double spends and signs last.
//!
//! ## Design Decisions
//!
//! - Ids are SHA-256 of the canonical bincode encoding of the components,
//!   excluding signatures, so they can be computed before anyone signs.
//! - A notary signature is required only when a transaction consumes
//!   inputs. Issuances have nothing to double-spend.

pub mod builder;
pub mod command;
pub mod ledger;
pub mod signing;
pub mod types;
pub mod verification;
pub mod wire;

pub use builder::TransactionBuilder;
pub use command::{CashCommand, Command, CommandData, IouCommand};
pub use ledger::{IouGroup, LedgerTransaction};
pub use signing::{SignatureError, SignedTransaction, TransactionSignature};
pub use types::{Amount, AmountError, Currency};
pub use verification::{
    resolve, verify_structure, ResolutionError, StateResolver, TransactionError,
};
pub use wire::WireTransaction;
