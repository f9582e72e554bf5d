//! In-memory request store for tests and ephemeral deployments.

use super::{LearningRequest, RequestStore, VaultEntry};
use crate::error::StoreError;
use crate::fingerprint::Fingerprint;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// [`RequestStore`] held entirely in memory. Same semantics as the Sled store, no durability.
#[derive(Default)]
pub struct MemoryRequestStore {
    requests: DashMap<Uuid, LearningRequest>,
    vault: RwLock<Vec<VaultEntry>>,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestStore for MemoryRequestStore {
    fn insert_request(&self, request: &LearningRequest) -> Result<(), StoreError> {
        match self.requests.entry(request.id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(request.clone());
                Ok(())
            }
        }
    }

    fn get_request(&self, id: &Uuid) -> Result<Option<LearningRequest>, StoreError> {
        Ok(self.requests.get(id).map(|r| r.value().clone()))
    }

    fn replace_request(&self, request: &LearningRequest) -> Result<(), StoreError> {
        self.requests.insert(request.id, request.clone());
        Ok(())
    }

    fn scan_requests(&self) -> Result<Vec<LearningRequest>, StoreError> {
        Ok(self.requests.iter().map(|r| r.value().clone()).collect())
    }

    fn vault_request(&self, request: &LearningRequest, entry: &VaultEntry) -> Result<(), StoreError> {
        // The vault write lock spans both writes, so vault readers never see half a denial.
        let mut vault = self.vault.write().map_err(|_| StoreError::Poisoned)?;
        if vault.iter().any(|e| e.fingerprint.matches(&entry.fingerprint)) {
            return Err(StoreError::VaultConflict);
        }
        vault.push(entry.clone());
        self.requests.insert(request.id, request.clone());
        Ok(())
    }

    fn vault_matches(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        let vault = self.vault.read().map_err(|_| StoreError::Poisoned)?;
        Ok(vault.iter().any(|e| e.fingerprint.matches(fingerprint)))
    }

    fn scan_vault(&self) -> Result<Vec<VaultEntry>, StoreError> {
        let vault = self.vault.read().map_err(|_| StoreError::Poisoned)?;
        Ok(vault.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::{NewRequest, RequestStatus};

    #[test]
    fn behaves_like_the_durable_store() {
        let store = MemoryRequestStore::new();
        let mut req = LearningRequest::pending(
            NewRequest::new("Topic", "content A"),
            Fingerprint::of("content A"),
            1,
        );
        store.insert_request(&req).unwrap();
        assert!(matches!(store.insert_request(&req), Err(StoreError::AlreadyExists)));

        let entry = req.deny("no", 2).unwrap();
        store.vault_request(&req, &entry).unwrap();
        assert_eq!(
            store.get_request(&req.id).unwrap().unwrap().status,
            RequestStatus::Vaulted
        );
        assert!(store.vault_matches(&Fingerprint::of("CONTENT a")).unwrap());
        assert!(matches!(
            store.vault_request(&req, &entry),
            Err(StoreError::VaultConflict)
        ));
        assert_eq!(store.scan_vault().unwrap().len(), 1);
    }
}
