//! The explicit "who am I and what can I reach" value every flow runs with.

use std::sync::Arc;

use iou_protocol::{Party, SignedTransaction};

use crate::metrics::NodeMetrics;
use crate::services::{IdentityService, KeyManagementService, MessagingService, NotaryClient, Vault};

/// Services and identity of the node a flow runs on.
#[derive(Clone)]
pub struct FlowContext {
    pub identity: Party,
    pub keys: Arc<KeyManagementService>,
    pub vault: Arc<Vault>,
    pub identities: Arc<IdentityService>,
    pub notary: Arc<dyn NotaryClient>,
    pub messaging: Arc<MessagingService>,
    pub metrics: Arc<NodeMetrics>,
}

impl FlowContext {
    pub fn notary_party(&self) -> Party {
        self.notary.identity().clone()
    }

    /// Record a finished transaction locally.
    pub fn record_transaction(&self, stx: &SignedTransaction) {
        if self.vault.record_transaction(stx) {
            self.metrics.transactions_recorded_total.inc();
            tracing::info!(node = %self.identity, tx_id = %stx.id(), "transaction recorded");
        }
    }
}

impl std::fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
