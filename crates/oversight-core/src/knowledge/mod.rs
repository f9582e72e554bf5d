//! Hand-off of approved content to the agent's permanent knowledge.

mod store;

pub use store::{KbRecord, KbStatus, KnowledgeStore};

use crate::error::{RegistryError, SinkError};
use crate::requests::LearningRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// What the knowledge store receives for one approved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Stable per content (derived from the exact fingerprint), so a repeated write is a no-op.
    pub key: String,
    pub content: String,
    pub category: String,
    pub source: String,
    pub tags: BTreeSet<String>,
    pub request_id: Uuid,
}

impl KnowledgeItem {
    pub fn from_request(request: &LearningRequest) -> Self {
        Self {
            key: request.fingerprint.exact.clone(),
            content: request.content.clone(),
            category: request.category.clone(),
            source: request.source.clone(),
            tags: request.tags.clone(),
            request_id: request.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    /// The key was already present; nothing was written.
    AlreadyPresent,
}

/// The external knowledge store, as far as this crate is concerned.
pub trait KnowledgeSink: Send + Sync {
    /// Stores `item` unless an item with the same key exists.
    fn store(&self, item: &KnowledgeItem) -> Result<StoreOutcome, SinkError>;
}

/// Thin adapter between an approved request and the knowledge sink.
pub struct IntegrationBridge {
    sink: Arc<dyn KnowledgeSink>,
}

impl IntegrationBridge {
    pub fn new(sink: Arc<dyn KnowledgeSink>) -> Self {
        Self { sink }
    }

    /// Writes the request's content, category, source and tags to the sink.
    /// Sink failures surface as [`RegistryError::StoreUnavailable`] and are safe to retry.
    pub fn integrate(&self, request: &LearningRequest) -> Result<StoreOutcome, RegistryError> {
        let item = KnowledgeItem::from_request(request);
        match self.sink.store(&item) {
            Ok(outcome) => {
                tracing::info!(
                    target: "oversight::knowledge",
                    request_id = %request.id,
                    category = %item.category,
                    outcome = ?outcome,
                    "Approved content handed to knowledge store"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(
                    target: "oversight::knowledge",
                    request_id = %request.id,
                    error = %e,
                    "Knowledge store write failed; request stays APPROVED"
                );
                Err(RegistryError::StoreUnavailable(e.to_string()))
            }
        }
    }
}
