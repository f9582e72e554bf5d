//! Derived fingerprint index: digest -> (status, request id).
//!
//! A cache over the store, used only to answer "has this content been submitted before"
//! quickly. It can always be rebuilt from a full scan. Vault checks never rely on it.

use super::{LearningRequest, RequestStatus, RequestStore};
use crate::error::StoreError;
use crate::fingerprint::Fingerprint;
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub status: RequestStatus,
    pub request_id: Uuid,
}

#[derive(Default)]
pub struct RequestIndex {
    by_digest: DashMap<String, IndexEntry>,
}

impl RequestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-reads every request and vault entry from `store`. Records are never deleted, so
    /// rebuilding upserts in place instead of clearing first. Returns the number of digests indexed.
    pub fn rebuild(&self, store: &dyn RequestStore) -> Result<usize, StoreError> {
        for request in store.scan_requests()? {
            self.record(&request);
        }
        for entry in store.scan_vault()? {
            let indexed = IndexEntry {
                status: RequestStatus::Vaulted,
                request_id: entry.original_request_id,
            };
            for digest in entry.fingerprint.digests() {
                self.by_digest.insert(digest.to_string(), indexed);
            }
        }
        Ok(self.by_digest.len())
    }

    /// Indexes (or re-indexes) both digests of `request` under its current status.
    pub fn record(&self, request: &LearningRequest) {
        let indexed = IndexEntry {
            status: request.status,
            request_id: request.id,
        };
        for digest in request.fingerprint.digests() {
            self.by_digest.insert(digest.to_string(), indexed);
        }
    }

    /// First hit on the exact digest, then the normalized one.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<IndexEntry> {
        fingerprint
            .digests()
            .iter()
            .find_map(|d| self.by_digest.get(*d).map(|e| *e.value()))
    }

    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }
}
