//! Decision notifications for reviewer-side tooling (audit feeds, downstream listeners).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Receiver half handed out by [`crate::RequestRegistry::subscribe`].
pub type DecisionReceiver = broadcast::Receiver<DecisionEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Submitted,
    Approved,
    Integrated,
    IntegrationFailed,
    Vaulted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub kind: DecisionKind,
    pub request_id: Uuid,
    /// Unix ms.
    pub timestamp_ms: i64,
}

impl DecisionEvent {
    pub fn now(kind: DecisionKind, request_id: Uuid) -> Self {
        Self {
            kind,
            request_id,
            timestamp_ms: crate::shared::now_ms(),
        }
    }
}

/// Fan-out publisher. Publishing never blocks and never fails the caller's operation.
pub(crate) struct EventBus {
    tx: broadcast::Sender<DecisionEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn publish(&self, kind: DecisionKind, request_id: Uuid) {
        // no subscribers is the normal case outside of reviewer tooling
        let _ = self.tx.send(DecisionEvent::now(kind, request_id));
    }

    pub(crate) fn subscribe(&self) -> DecisionReceiver {
        self.tx.subscribe()
    }
}
