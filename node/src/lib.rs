//! # IOU Ledger Node
//!
//! Everything with I/O: the per-node services (keys, identities, vault,
//! messaging, notary), the flows that run between nodes, the in-process
//! [`Network`] and the HTTP API over it.
//!
//! - **services** — Reference implementations of the node services.
//! - **flow** — Issue, transfer and settle protocols plus their responder.
//! - **node** — A party's node and the network that connects them.
//! - **api** — axum router.
//! - **metrics** / **logging** / **cli** — Operational plumbing for the binary.

pub mod api;
pub mod cli;
pub mod flow;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod services;

pub use flow::{FlowContext, FlowError};
pub use node::{Network, Node};
