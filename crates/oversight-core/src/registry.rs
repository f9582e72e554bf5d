//! RequestRegistry: submission, review queue, approval and denial.
//!
//! Writers serialize per key: `submit` on the normalized content digest, decisions on the
//! request id. Unrelated keys never wait on each other. The store is the source of truth;
//! the in-process index only speeds up duplicate detection.

use crate::error::RegistryError;
use crate::events::{DecisionKind, DecisionReceiver, EventBus};
use crate::fingerprint::Fingerprint;
use crate::gate::AccessGate;
use crate::knowledge::{IntegrationBridge, KnowledgeSink};
use crate::requests::{LearningRequest, NewRequest, RequestIndex, RequestStatus, RequestStore, VaultEntry};
use crate::shared::{now_ms, Role};
use crate::StoreError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Reviewer-facing counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub pending: usize,
    pub approved: usize,
    pub integrated: usize,
    pub vaulted: usize,
    pub vault_entries: usize,
}

/// One mutex per live key; slots are dropped again once nobody holds or waits on them.
#[derive(Default)]
struct KeyedLocks {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let slot = self.slots.entry(key.to_string()).or_default().clone();
        let out = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(slot);
        self.slots.remove_if(key, |_, s| Arc::strong_count(s) == 1);
        out
    }
}

pub struct RequestRegistry {
    store: Arc<dyn RequestStore>,
    index: RequestIndex,
    bridge: IntegrationBridge,
    submit_locks: KeyedLocks,
    decision_locks: KeyedLocks,
    events: EventBus,
}

impl RequestRegistry {
    /// Builds a registry over `store`, handing approved content to `sink`. The fingerprint
    /// index is rebuilt from the store before the registry is returned.
    pub fn new(store: Arc<dyn RequestStore>, sink: Arc<dyn KnowledgeSink>) -> Result<Self, RegistryError> {
        Self::with_event_capacity(store, sink, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(
        store: Arc<dyn RequestStore>,
        sink: Arc<dyn KnowledgeSink>,
        event_capacity: usize,
    ) -> Result<Self, RegistryError> {
        let registry = Self {
            store,
            index: RequestIndex::new(),
            bridge: IntegrationBridge::new(sink),
            submit_locks: KeyedLocks::default(),
            decision_locks: KeyedLocks::default(),
            events: EventBus::new(event_capacity),
        };
        registry.rebuild_index()?;
        Ok(registry)
    }

    /// Rebuilds the derived fingerprint index from a full store scan.
    pub fn rebuild_index(&self) -> Result<usize, RegistryError> {
        let digests = self.index.rebuild(self.store.as_ref())?;
        tracing::info!(target: "oversight::registry", digests, "Fingerprint index rebuilt");
        Ok(digests)
    }

    /// Decision events (submitted, approved, integrated, vaulted). Reviewer tooling only.
    pub fn subscribe(&self) -> DecisionReceiver {
        self.events.subscribe()
    }

    /// The decision stream as `role` may see it. `None` for producers.
    pub fn subscribe_as(&self, role: Role) -> Option<DecisionReceiver> {
        AccessGate::event_view(role, || self.subscribe())
    }

    /// Queues a proposal for review.
    ///
    /// Fails with [`RegistryError::DuplicateContent`] if the content (exactly, or up to case and
    /// whitespace) was ever submitted before or is vaulted. The error is identical in both cases.
    pub fn submit(&self, input: NewRequest) -> Result<Uuid, RegistryError> {
        if input.title.trim().is_empty() {
            return Err(RegistryError::InvalidInput("title is required".to_string()));
        }
        if input.content.trim().is_empty() {
            return Err(RegistryError::InvalidInput("content is required".to_string()));
        }

        let fingerprint = Fingerprint::of(&input.content);
        let lock_key = fingerprint.lock_key().to_string();
        self.submit_locks.with_lock(&lock_key, || {
            if self.store.vault_matches(&fingerprint)? {
                tracing::info!(
                    target: "oversight::vault",
                    fingerprint = %fingerprint.exact,
                    "Submission matched vaulted content; rejected"
                );
                return Err(RegistryError::DuplicateContent);
            }
            if let Some(prior) = self.index.lookup(&fingerprint) {
                tracing::info!(
                    target: "oversight::registry",
                    prior_request = %prior.request_id,
                    prior_status = %prior.status,
                    "Submission duplicates an earlier request; rejected"
                );
                return Err(RegistryError::DuplicateContent);
            }

            let request = LearningRequest::pending(input, fingerprint.clone(), now_ms());
            self.store.insert_request(&request)?;
            self.index.record(&request);
            tracing::info!(
                target: "oversight::registry",
                request_id = %request.id,
                priority = ?request.priority,
                category = %request.category,
                "Learning request queued for review"
            );
            self.events.publish(DecisionKind::Submitted, request.id);
            Ok(request.id)
        })
    }

    /// PENDING requests ordered by priority (highest first), then age (oldest first).
    /// Always empty for producers.
    pub fn list_pending(&self, role: Role) -> Result<Vec<LearningRequest>, RegistryError> {
        AccessGate::pending_view(role, || -> Result<_, RegistryError> {
            let mut pending: Vec<LearningRequest> = self
                .store
                .scan_requests()?
                .into_iter()
                .filter(|r| r.status == RequestStatus::Pending)
                .collect();
            pending.sort_by(LearningRequest::review_order);
            Ok(pending)
        })
    }

    /// Approves a PENDING request, then hands it to the knowledge store.
    ///
    /// If the hand-off fails the approval stands (status APPROVED) and
    /// [`RegistryError::StoreUnavailable`] is returned; use [`Self::retry_integration`].
    pub fn approve(&self, id: Uuid, notes: &str) -> Result<(), RegistryError> {
        self.decision_locks.with_lock(&id.to_string(), || {
            let mut request = self.store.get_request(&id)?.ok_or(RegistryError::NotFound)?;
            request
                .approve(notes, now_ms())
                .map_err(RegistryError::InvalidState)?;
            self.store.replace_request(&request)?;
            self.index.record(&request);
            tracing::info!(target: "oversight::registry", request_id = %id, "Learning request approved");
            self.events.publish(DecisionKind::Approved, id);
            self.integrate_locked(request)
        })
    }

    /// Re-runs the knowledge store hand-off for a request left APPROVED by an earlier failure.
    pub fn retry_integration(&self, id: Uuid) -> Result<(), RegistryError> {
        self.decision_locks.with_lock(&id.to_string(), || {
            let request = self.store.get_request(&id)?.ok_or(RegistryError::NotFound)?;
            if request.status != RequestStatus::Approved {
                return Err(RegistryError::InvalidState(request.status));
            }
            self.integrate_locked(request)
        })
    }

    // Caller holds the decision lock for `request.id`.
    fn integrate_locked(&self, mut request: LearningRequest) -> Result<(), RegistryError> {
        if let Err(e) = self.bridge.integrate(&request) {
            self.events.publish(DecisionKind::IntegrationFailed, request.id);
            return Err(e);
        }
        request
            .mark_integrated(now_ms())
            .map_err(RegistryError::InvalidState)?;
        self.store.replace_request(&request)?;
        self.index.record(&request);
        tracing::info!(target: "oversight::registry", request_id = %request.id, "Learning request integrated");
        self.events.publish(DecisionKind::Integrated, request.id);
        Ok(())
    }

    /// Denies a PENDING request and vaults its fingerprints in one step.
    pub fn deny(&self, id: Uuid, reason: &str) -> Result<(), RegistryError> {
        self.decision_locks.with_lock(&id.to_string(), || {
            let mut request = self.store.get_request(&id)?.ok_or(RegistryError::NotFound)?;
            let entry = request
                .deny(reason, now_ms())
                .map_err(RegistryError::InvalidState)?;
            match self.store.vault_request(&request, &entry) {
                Ok(()) => {}
                Err(StoreError::VaultConflict) => {
                    // Content already vaulted through another request; the record still goes terminal.
                    tracing::warn!(
                        target: "oversight::vault",
                        request_id = %id,
                        "Fingerprint already vaulted; marking request VAULTED without a new entry"
                    );
                    self.store.replace_request(&request)?;
                }
                Err(e) => return Err(e.into()),
            }
            self.index.record(&request);
            tracing::info!(target: "oversight::registry", request_id = %id, "Learning request denied and vaulted");
            self.events.publish(DecisionKind::Vaulted, id);
            Ok(())
        })
    }

    /// Whether `content` is worth proposing. Reviewers always get `true`; producers get
    /// `false` for vaulted content (exact or case/whitespace variant), with no further detail.
    /// Fails closed: if the vault cannot be read, producers get `false`.
    pub fn check_relevance(&self, content: &str, role: Role) -> bool {
        AccessGate::relevance(role, || {
            let fingerprint = Fingerprint::of(content);
            self.store.vault_matches(&fingerprint).unwrap_or_else(|e| {
                tracing::warn!(target: "oversight::vault", error = %e, "Vault lookup failed; treating content as blocked");
                true
            })
        })
    }

    /// A single request as `role` may see it.
    pub fn get_request(&self, id: Uuid, role: Role) -> Result<Option<LearningRequest>, RegistryError> {
        Ok(AccessGate::request_view(role, self.store.get_request(&id)?))
    }

    /// Vault contents for audit. Always empty for producers.
    pub fn list_vault(&self, role: Role) -> Result<Vec<VaultEntry>, RegistryError> {
        AccessGate::vault_view(role, || -> Result<_, RegistryError> {
            let mut entries = self.store.scan_vault()?;
            entries.sort_by_key(|e| e.denied_at);
            Ok(entries)
        })
    }

    /// Request and vault counts. `None` for producers.
    pub fn statistics(&self, role: Role) -> Result<Option<RegistryStats>, RegistryError> {
        AccessGate::stats_view(role, || -> Result<_, RegistryError> {
            let mut stats = RegistryStats::default();
            for request in self.store.scan_requests()? {
                match request.status {
                    RequestStatus::Pending => stats.pending += 1,
                    RequestStatus::Approved => stats.approved += 1,
                    RequestStatus::Integrated => stats.integrated += 1,
                    RequestStatus::Denied | RequestStatus::Vaulted => stats.vaulted += 1,
                }
            }
            stats.vault_entries = self.store.scan_vault()?.len();
            Ok(stats)
        })
    }

    /// Flushes the underlying store.
    pub fn flush(&self) -> Result<(), RegistryError> {
        Ok(self.store.flush()?)
    }
}
