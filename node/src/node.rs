//! # Nodes and the in-process network
//!
//! A [`Node`] is one participant: a legal identity, its services and an
//! inbox dispatcher that starts a [`Responder`] for every session another
//! node opens with it.
//!
//! A [`Network`] wires nodes to one notary and one messaging service and
//! makes every node's identity known to every other node.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use iou_protocol::config::DEFAULT_NOTARY_NAME;
use iou_protocol::{Amount, CashState, IouState, Party, SignedTransaction, StateAndRef, UniqueIdentifier};

use crate::flow::{
    self, AcceptAll, FlowContext, FlowError, ProposalCheck, Responder, SettleFlow,
};
use crate::metrics::NodeMetrics;
use crate::services::{
    IdentityService, InMemoryNotary, IncomingSession, KeyManagementService, MessagingService,
    NotaryClient, Vault,
};

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

pub struct Node {
    ctx: FlowContext,
    dispatcher: JoinHandle<()>,
}

impl Node {
    /// Start a node's dispatcher on the current tokio runtime.
    fn start(
        ctx: FlowContext,
        inbox: mpsc::Receiver<IncomingSession>,
        check: Arc<dyn ProposalCheck>,
    ) -> Self {
        let dispatcher = tokio::spawn(dispatch(ctx.clone(), inbox, check));
        Self { ctx, dispatcher }
    }

    pub fn identity(&self) -> &Party {
        &self.ctx.identity
    }

    pub fn context(&self) -> &FlowContext {
        &self.ctx
    }

    pub fn vault(&self) -> &Vault {
        &self.ctx.vault
    }

    /// Issue `iou`. This node must be its lender or borrower.
    pub async fn issue_iou(&self, iou: IouState) -> Result<SignedTransaction, FlowError> {
        self.instrument("issue", flow::issue_iou(&self.ctx, iou)).await
    }

    pub async fn transfer_iou(
        &self,
        linear_id: UniqueIdentifier,
        new_lender: Party,
    ) -> Result<SignedTransaction, FlowError> {
        self.instrument("transfer", flow::transfer_iou(&self.ctx, linear_id, new_lender))
            .await
    }

    /// Pay `amount` towards the IOU. This node must be its borrower.
    pub async fn settle_iou(
        &self,
        linear_id: UniqueIdentifier,
        amount: Amount,
    ) -> Result<SignedTransaction, FlowError> {
        self.instrument("settle", SettleFlow::new(&self.ctx, linear_id, amount).run())
            .await
    }

    pub async fn self_issue_cash(&self, amount: Amount) -> Result<CashState, FlowError> {
        self.instrument("self_issue", flow::self_issue_cash(&self.ctx, amount))
            .await
    }

    pub fn ious(&self) -> Vec<StateAndRef> {
        self.ctx.vault.unconsumed_ious()
    }

    pub fn iou(&self, linear_id: &UniqueIdentifier) -> Option<IouState> {
        self.ctx
            .vault
            .query_iou_by_linear_id(linear_id)
            .and_then(|s| s.iou().cloned())
    }

    async fn instrument<T>(
        &self,
        name: &str,
        flow: impl Future<Output = Result<T, FlowError>>,
    ) -> Result<T, FlowError> {
        let node = self.ctx.identity.name.as_str();
        self.ctx.metrics.flow_started(node, name);
        let started = Instant::now();
        let result = flow.await;
        self.ctx
            .metrics
            .flow_finished(node, name, result.is_ok(), started.elapsed());
        result
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("identity", &self.ctx.identity).finish()
    }
}

/// Start a responder for every incoming session until the inbox closes.
async fn dispatch(
    ctx: FlowContext,
    mut inbox: mpsc::Receiver<IncomingSession>,
    check: Arc<dyn ProposalCheck>,
) {
    while let Some(incoming) = inbox.recv().await {
        let ctx = ctx.clone();
        let check = check.clone();
        tokio::spawn(async move {
            let name = format!("{}_responder", incoming.kind);
            let node = ctx.identity.name.clone();
            ctx.metrics.flow_started(&node, &name);
            let started = Instant::now();
            let result = Responder::new(ctx.clone(), incoming.session, incoming.kind, check)
                .run()
                .await;
            ctx.metrics
                .flow_finished(&node, &name, result.is_ok(), started.elapsed());
        });
    }
    tracing::debug!(node = %ctx.identity, "inbox closed");
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

pub struct Network {
    notary: Arc<InMemoryNotary>,
    messaging: Arc<MessagingService>,
    metrics: Arc<NodeMetrics>,
    nodes: DashMap<String, Arc<Node>>,
}

impl Network {
    pub fn new(metrics: Arc<NodeMetrics>) -> Self {
        Self::with_notary(DEFAULT_NOTARY_NAME, metrics)
    }

    pub fn with_notary(notary_name: &str, metrics: Arc<NodeMetrics>) -> Self {
        Self {
            notary: Arc::new(InMemoryNotary::new(notary_name)),
            messaging: Arc::new(MessagingService::new()),
            metrics,
            nodes: DashMap::new(),
        }
    }

    pub fn notary(&self) -> &Arc<InMemoryNotary> {
        &self.notary
    }

    pub fn messaging(&self) -> &Arc<MessagingService> {
        &self.messaging
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    /// Receive timeout for sessions opened from now on.
    pub fn set_session_timeout(&self, timeout: Duration) {
        self.messaging.set_receive_timeout(timeout);
    }

    /// Add a node that signs anything the contracts accept.
    pub fn add_node(&self, name: &str) -> Result<Arc<Node>, FlowError> {
        self.add_node_with_check(name, Arc::new(AcceptAll))
    }

    /// Add a node with its own acceptance check. Must be called from inside a
    /// tokio runtime.
    pub fn add_node_with_check(
        &self,
        name: &str,
        check: Arc<dyn ProposalCheck>,
    ) -> Result<Arc<Node>, FlowError> {
        if self.nodes.contains_key(name) || name == self.notary.identity().name {
            return Err(FlowError::InvalidRequest(format!("party {name} already exists")));
        }
        let keys = Arc::new(KeyManagementService::generate(name));
        let identity = keys.identity().clone();
        let identities = Arc::new(IdentityService::new());
        identities.register_party(&identity);
        identities.register_party(self.notary.identity());
        for existing in self.nodes.iter() {
            identities.register_party(existing.identity());
            existing.ctx.identities.register_party(&identity);
        }

        let notary: Arc<dyn NotaryClient> = self.notary.clone();
        let ctx = FlowContext {
            identity: identity.clone(),
            vault: Arc::new(Vault::new(keys.clone())),
            keys,
            identities,
            notary,
            messaging: self.messaging.clone(),
            metrics: self.metrics.clone(),
        };
        let inbox = self.messaging.register(&identity);
        let node = Arc::new(Node::start(ctx, inbox, check));
        self.nodes.insert(name.to_string(), node.clone());
        tracing::info!(node = %identity, key = %identity.owning_key.short(), "node joined");
        Ok(node)
    }

    pub fn node(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes.get(name).map(|n| n.value().clone())
    }

    /// Every node's identity, sorted by name.
    pub fn parties(&self) -> Vec<Party> {
        let mut parties: Vec<Party> = self.nodes.iter().map(|n| n.identity().clone()).collect();
        parties.sort_by(|a, b| a.name.cmp(&b.name));
        parties
    }

    /// Resolve a well-known party by name.
    pub fn party(&self, name: &str) -> Result<Party, FlowError> {
        self.node(name)
            .map(|n| n.identity().clone())
            .ok_or_else(|| FlowError::UnknownParty(name.to_string()))
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("notary", &self.notary.identity())
            .field("nodes", &self.parties())
            .finish()
    }
}
