//! Learning requests, the vault, and the storage they live in.
//!
//! ## Lifecycle
//!
//! | From     | To         | Trigger                              |
//! |----------|------------|--------------------------------------|
//! | (new)    | PENDING    | `submit`                             |
//! | PENDING  | APPROVED   | `approve`                            |
//! | APPROVED | INTEGRATED | bridge write succeeds (or a retry)   |
//! | PENDING  | VAULTED    | `deny` (DENIED is never persisted)   |
//!
//! Records are never deleted; terminal records stay for audit.

mod index;
mod memory;
mod store;

pub use index::{IndexEntry, RequestIndex};
pub use memory::MemoryRequestStore;
pub use store::{RequestStore, SledRequestStore};

use crate::fingerprint::Fingerprint;
use crate::shared::Priority;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Request status. See the module table for the allowed edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
    Integrated,
    Vaulted,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Integrated | Self::Vaulted)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Denied => "DENIED",
            Self::Integrated => "INTEGRATED",
            Self::Vaulted => "VAULTED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Producer input for `submit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl NewRequest {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = justification.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A proposed piece of knowledge under (or past) human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRequest {
    pub id: Uuid,
    pub title: String,
    /// The payload under review. Never rewritten after creation.
    pub content: String,
    pub category: String,
    pub justification: String,
    pub source: String,
    pub tags: BTreeSet<String>,
    pub priority: Priority,
    pub status: RequestStatus,
    /// Computed once at creation from `content`.
    pub fingerprint: Fingerprint,
    /// Unix ms.
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_notes: Option<String>,
}

impl LearningRequest {
    /// Creates a PENDING request with a fresh id.
    pub fn pending(input: NewRequest, fingerprint: Fingerprint, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: input.title,
            content: input.content,
            category: input.category,
            justification: input.justification,
            source: input.source,
            tags: input.tags,
            priority: input.priority,
            status: RequestStatus::Pending,
            fingerprint,
            created_at,
            decided_at: None,
            integrated_at: None,
            decision_notes: None,
        }
    }

    /// PENDING -> APPROVED. On a wrong state returns the current status and changes nothing.
    pub fn approve(&mut self, notes: impl Into<String>, at: i64) -> Result<(), RequestStatus> {
        if self.status != RequestStatus::Pending {
            return Err(self.status);
        }
        self.status = RequestStatus::Approved;
        self.decided_at = Some(at);
        self.decision_notes = Some(notes.into());
        Ok(())
    }

    /// APPROVED -> INTEGRATED.
    pub fn mark_integrated(&mut self, at: i64) -> Result<(), RequestStatus> {
        if self.status != RequestStatus::Approved {
            return Err(self.status);
        }
        self.status = RequestStatus::Integrated;
        self.integrated_at = Some(at);
        Ok(())
    }

    /// PENDING -> VAULTED, returning the vault entry to append alongside.
    pub fn deny(&mut self, reason: impl Into<String>, at: i64) -> Result<VaultEntry, RequestStatus> {
        if self.status != RequestStatus::Pending {
            return Err(self.status);
        }
        let reason = reason.into();
        self.status = RequestStatus::Vaulted;
        self.decided_at = Some(at);
        self.decision_notes = Some(reason.clone());
        Ok(VaultEntry {
            fingerprint: self.fingerprint.clone(),
            reason,
            denied_at: at,
            original_request_id: self.id,
        })
    }

    /// Review ordering: priority descending, then oldest first. Id breaks exact ties.
    pub fn review_order(a: &Self, b: &Self) -> std::cmp::Ordering {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    }
}

/// Permanent record of denied content. Only the fingerprint pair is consulted for matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub fingerprint: Fingerprint,
    pub reason: String,
    /// Unix ms.
    pub denied_at: i64,
    /// Audit back-reference. Never shown to producers.
    pub original_request_id: Uuid,
}
