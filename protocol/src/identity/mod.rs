//! # Identity Module
//!
//! Who is who on the ledger. Every participant is an Ed25519 key; some keys
//! also carry a legal name.
//!
//! 1. **Party** — a legal name and the key the network knows it by.
//! 2. **AnonymousParty** — a confidential key with no name attached. Cash
//!    change is addressed to these.
//! 3. **IdentityCertificate** — a party's signed claim over one of its
//!    confidential keys, exchanged during identity sync so the counterparty
//!    can tell who signed a transaction.

pub mod certificate;
pub mod party;

pub use certificate::{CertificateError, IdentityCertificate};
pub use party::{AbstractParty, AnonymousParty, Party};
