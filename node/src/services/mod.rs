//! In-memory services a node's protocols run against.
//!
//! - **keys** — legal and confidential keypairs, signing.
//! - **identity** — well-known parties and confidential identity certificates.
//! - **vault** — recorded transactions and relevant unconsumed states.
//! - **cash** — cash selection and spend generation.
//! - **notary** — the commit service that prevents double spends.
//! - **messaging** — sessions between nodes.

pub mod cash;
pub mod identity;
pub mod keys;
pub mod messaging;
pub mod notary;
pub mod vault;

pub use cash::{generate_spend, SpendError};
pub use identity::IdentityService;
pub use keys::{KeyManagementService, KeyServiceError};
pub use messaging::{FlowSession, IncomingSession, MessagingService, SessionError, SessionEvent};
pub use notary::{InMemoryNotary, NotaryClient, NotaryError};
pub use vault::{Vault, VaultError, WithDependencies};
