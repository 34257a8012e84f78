//! # Messaging
//!
//! Sessions between nodes of an in-process network.
//!
//! A [`FlowSession`] is one end of an ordered, bidirectional channel pair
//! between two protocol instances. Payloads are JSON-encoded
//! [`FlowMessage`]s so the transport stays oblivious to their content.
//!
//! Receiving is where a protocol suspends. [`FlowSession::receive_event`]
//! resumes with exactly one [`SessionEvent`]. Anything other than a decoded
//! message becomes an error in the typed helpers.
//!
//! The [`MessagingService`] routes new sessions to the inbox of the target
//! node, where a dispatcher starts the matching responder.

use dashmap::DashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use iou_protocol::config::{INBOX_CAPACITY, SESSION_CHANNEL_CAPACITY, SESSION_RECEIVE_TIMEOUT};
use iou_protocol::Party;

use crate::flow::message::{FlowKind, FlowMessage};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// No node with that name is registered on the network.
    #[error("unknown counterparty {0}")]
    UnknownCounterparty(String),

    /// The counterparty's inbox or session channel is closed.
    #[error("session {session_id} with {counterparty} closed")]
    Closed {
        session_id: Uuid,
        counterparty: String,
    },

    /// Nothing arrived within the receive timeout.
    #[error("timed out after {timeout_ms}ms waiting for {counterparty}")]
    TimedOut {
        counterparty: String,
        timeout_ms: u64,
    },

    /// A payload could not be encoded or decoded.
    #[error("malformed message from {counterparty}: {reason}")]
    Malformed {
        counterparty: String,
        reason: String,
    },

    /// A well-formed message arrived at the wrong point of the protocol.
    #[error("unexpected {got} from {counterparty}, expected {expected}")]
    Unexpected {
        counterparty: String,
        expected: &'static str,
        got: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// What a suspended receive resumes with.
#[derive(Debug)]
pub enum SessionEvent {
    Message(FlowMessage),
    /// A payload arrived but did not decode.
    Malformed(String),
    TimedOut,
    Closed,
}

/// One end of a session.
#[derive(Debug)]
pub struct FlowSession {
    id: Uuid,
    counterparty: Party,
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<String>,
    receive_timeout: Duration,
}

impl FlowSession {
    /// Two connected ends: `(a_end, b_end)`. `a_end` talks to `b`, and vice
    /// versa.
    pub fn pair(a: &Party, b: &Party, receive_timeout: Duration) -> (FlowSession, FlowSession) {
        let id = Uuid::new_v4();
        let (a_tx, b_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let (b_tx, a_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        (
            FlowSession {
                id,
                counterparty: b.clone(),
                outbound: a_tx,
                inbound: a_rx,
                receive_timeout,
            },
            FlowSession {
                id,
                counterparty: a.clone(),
                outbound: b_tx,
                inbound: b_rx,
                receive_timeout,
            },
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn counterparty(&self) -> &Party {
        &self.counterparty
    }

    pub fn set_receive_timeout(&mut self, timeout: Duration) {
        self.receive_timeout = timeout;
    }

    pub async fn send(&self, message: &FlowMessage) -> Result<(), SessionError> {
        let payload = serde_json::to_string(message).map_err(|e| SessionError::Malformed {
            counterparty: self.counterparty.name.clone(),
            reason: e.to_string(),
        })?;
        tracing::trace!(
            session = %self.id,
            counterparty = %self.counterparty,
            message = message.name(),
            "send"
        );
        self.outbound
            .send(payload)
            .await
            .map_err(|_| self.closed())
    }

    /// Suspend until the next event on this session.
    pub async fn receive_event(&mut self) -> SessionEvent {
        match tokio::time::timeout(self.receive_timeout, self.inbound.recv()).await {
            Err(_) => SessionEvent::TimedOut,
            Ok(None) => SessionEvent::Closed,
            Ok(Some(payload)) => match serde_json::from_str::<FlowMessage>(&payload) {
                Ok(message) => SessionEvent::Message(message),
                Err(e) => {
                    tracing::warn!(
                        session = %self.id,
                        counterparty = %self.counterparty,
                        error = %e,
                        "malformed session payload"
                    );
                    SessionEvent::Malformed(e.to_string())
                }
            },
        }
    }

    /// Receive the next message, turning timeouts and closure into errors.
    pub async fn receive(&mut self) -> Result<FlowMessage, SessionError> {
        match self.receive_event().await {
            SessionEvent::Message(message) => Ok(message),
            SessionEvent::TimedOut => Err(SessionError::TimedOut {
                counterparty: self.counterparty.name.clone(),
                timeout_ms: self.receive_timeout.as_millis() as u64,
            }),
            SessionEvent::Malformed(reason) => Err(SessionError::Malformed {
                counterparty: self.counterparty.name.clone(),
                reason,
            }),
            SessionEvent::Closed => Err(self.closed()),
        }
    }

    /// Protocol-violation error for a message that arrived out of turn.
    pub fn unexpected(&self, expected: &'static str, got: &FlowMessage) -> SessionError {
        SessionError::Unexpected {
            counterparty: self.counterparty.name.clone(),
            expected,
            got: got.name(),
        }
    }

    fn closed(&self) -> SessionError {
        SessionError::Closed {
            session_id: self.id,
            counterparty: self.counterparty.name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// A session opened by a remote initiator.
#[derive(Debug)]
pub struct IncomingSession {
    pub kind: FlowKind,
    pub session: FlowSession,
}

/// Routes session initiations between registered nodes.
#[derive(Debug, Default)]
pub struct MessagingService {
    inboxes: DashMap<String, mpsc::Sender<IncomingSession>>,
    receive_timeout: parking_lot::RwLock<Option<Duration>>,
}

impl MessagingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive timeout applied to new sessions.
    pub fn receive_timeout(&self) -> Duration {
        (*self.receive_timeout.read()).unwrap_or(SESSION_RECEIVE_TIMEOUT)
    }

    pub fn set_receive_timeout(&self, timeout: Duration) {
        *self.receive_timeout.write() = Some(timeout);
    }

    /// Register `party` and return its inbox.
    pub fn register(&self, party: &Party) -> mpsc::Receiver<IncomingSession> {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.inboxes.insert(party.name.clone(), tx);
        rx
    }

    pub fn unregister(&self, party: &Party) {
        self.inboxes.remove(&party.name);
    }

    /// Open a session from `from` to `to`, delivering the far end to `to`'s
    /// inbox tagged with `kind`.
    pub async fn initiate_session(
        &self,
        from: &Party,
        to: &Party,
        kind: FlowKind,
    ) -> Result<FlowSession, SessionError> {
        let inbox = self
            .inboxes
            .get(&to.name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SessionError::UnknownCounterparty(to.name.clone()))?;

        let (ours, theirs) = FlowSession::pair(from, to, self.receive_timeout());
        let session_id = ours.id();
        inbox
            .send(IncomingSession {
                kind,
                session: theirs,
            })
            .await
            .map_err(|_| SessionError::Closed {
                session_id,
                counterparty: to.name.clone(),
            })?;
        tracing::debug!(session = %session_id, from = %from, to = %to, %kind, "session initiated");
        Ok(ours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iou_protocol::Keypair;

    fn party(name: &str) -> Party {
        Party::new(name, Keypair::generate().public_key())
    }

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let (a, mut b) = FlowSession::pair(&party("A"), &party("B"), Duration::from_secs(1));
        a.send(&FlowMessage::IdentityAck).await.unwrap();
        a.send(&FlowMessage::Rejected { reason: "x".into() })
            .await
            .unwrap();
        assert_eq!(b.receive().await.unwrap().name(), "IdentityAck");
        assert_eq!(b.receive().await.unwrap().name(), "Rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_counterparty_times_out() {
        let (_a, mut b) = FlowSession::pair(&party("A"), &party("B"), Duration::from_secs(5));
        assert!(matches!(b.receive_event().await, SessionEvent::TimedOut));
        match b.receive().await {
            Err(SessionError::TimedOut { timeout_ms, .. }) => assert_eq!(timeout_ms, 5_000),
            other => panic!("expected TimedOut, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dropped_counterparty_closes_session() {
        let (a, mut b) = FlowSession::pair(&party("A"), &party("B"), Duration::from_secs(1));
        drop(a);
        assert!(matches!(b.receive_event().await, SessionEvent::Closed));
    }

    #[tokio::test]
    async fn undecodable_payload_is_reported_as_malformed() {
        let (a, mut b) = FlowSession::pair(&party("A"), &party("B"), Duration::from_secs(1));
        a.outbound.send("{not json".to_string()).await.unwrap();
        a.outbound.send("{\"Unknown\":{}}".to_string()).await.unwrap();

        assert!(matches!(b.receive_event().await, SessionEvent::Malformed(_)));
        match b.receive().await {
            Err(SessionError::Malformed { counterparty, .. }) => assert_eq!(counterparty, "A"),
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn initiation_reaches_target_inbox() {
        let messaging = MessagingService::new();
        let alice = party("Alice");
        let bob = party("Bob");
        let mut inbox = messaging.register(&bob);

        let session = messaging
            .initiate_session(&alice, &bob, FlowKind::Settle)
            .await
            .unwrap();
        let incoming = inbox.recv().await.unwrap();
        assert_eq!(incoming.kind, FlowKind::Settle);
        assert_eq!(incoming.session.id(), session.id());
        assert_eq!(incoming.session.counterparty(), &alice);
    }

    #[tokio::test]
    async fn unknown_counterparty_is_an_error() {
        let messaging = MessagingService::new();
        let result = messaging
            .initiate_session(&party("A"), &party("Nobody"), FlowKind::Issue)
            .await;
        assert_eq!(
            result.unwrap_err(),
            SessionError::UnknownCounterparty("Nobody".into())
        );
    }
}
