//! Storage seam for requests and the vault, plus the Sled-backed implementation.
//!
//! Sled layout:
//!
//! | Tree                 | Key                   | Value                        |
//! |----------------------|-----------------------|------------------------------|
//! | `requests`           | request id (hyphenated) | JSON [`LearningRequest`]   |
//! | `vault`              | exact digest          | JSON [`VaultEntry`]          |
//! | `vault_fingerprints` | exact or normalized digest | exact digest of the entry |

use super::{LearningRequest, VaultEntry};
use crate::error::StoreError;
use crate::fingerprint::Fingerprint;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use std::path::Path;
use uuid::Uuid;

const REQUESTS_TREE: &str = "requests";
const VAULT_TREE: &str = "vault";
const VAULT_FINGERPRINTS_TREE: &str = "vault_fingerprints";

/// Durable keyed storage for requests and vault entries.
///
/// Every method is a single atomic unit. `vault_request` in particular must write the
/// request's terminal state and the vault entry together or not at all.
pub trait RequestStore: Send + Sync {
    /// Persists a new request. Fails with [`StoreError::AlreadyExists`] if the id is taken.
    fn insert_request(&self, request: &LearningRequest) -> Result<(), StoreError>;

    fn get_request(&self, id: &Uuid) -> Result<Option<LearningRequest>, StoreError>;

    /// Overwrites an existing request record (status transitions).
    fn replace_request(&self, request: &LearningRequest) -> Result<(), StoreError>;

    /// All request records, in no particular order.
    fn scan_requests(&self) -> Result<Vec<LearningRequest>, StoreError>;

    /// Writes the VAULTED request and appends `entry` atomically. The vault is write-once:
    /// fails with [`StoreError::VaultConflict`] if either digest is already vaulted.
    fn vault_request(&self, request: &LearningRequest, entry: &VaultEntry) -> Result<(), StoreError>;

    /// True if either digest of `fingerprint` is in the vault. Authoritative, keyed lookup.
    fn vault_matches(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError>;

    /// All vault entries, in no particular order.
    fn scan_vault(&self) -> Result<Vec<VaultEntry>, StoreError>;

    /// Durably persists buffered writes, where the backend buffers.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn request_key(id: &Uuid) -> String {
    id.hyphenated().to_string()
}

/// Request store with three Sled trees (requests, vault, vault fingerprint lookup).
pub struct SledRequestStore {
    db: Db,
    requests: Tree,
    vault: Tree,
    vault_fingerprints: Tree,
}

impl SledRequestStore {
    /// Opens or creates the request DB at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// Opens a throwaway DB that is removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let requests = db.open_tree(REQUESTS_TREE)?;
        let vault = db.open_tree(VAULT_TREE)?;
        let vault_fingerprints = db.open_tree(VAULT_FINGERPRINTS_TREE)?;
        Ok(Self {
            db,
            requests,
            vault,
            vault_fingerprints,
        })
    }

    fn decode_all<T: serde::de::DeserializeOwned>(tree: &Tree, what: &str) -> Result<Vec<T>, StoreError> {
        let mut out = Vec::new();
        for item in tree.iter() {
            let (k, v) = item?;
            match serde_json::from_slice::<T>(&v) {
                Ok(rec) => out.push(rec),
                Err(e) => tracing::warn!(
                    target: "oversight::store",
                    key = %String::from_utf8_lossy(&k),
                    error = %e,
                    "Skipping undecodable {} record",
                    what
                ),
            }
        }
        Ok(out)
    }
}

impl RequestStore for SledRequestStore {
    fn insert_request(&self, request: &LearningRequest) -> Result<(), StoreError> {
        let key = request_key(&request.id);
        let bytes = serde_json::to_vec(request)?;
        self.requests
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(bytes))?
            .map_err(|_| StoreError::AlreadyExists)?;
        tracing::debug!(
            target: "oversight::store",
            request_id = %request.id,
            status = %request.status,
            "Request record inserted"
        );
        Ok(())
    }

    fn get_request(&self, id: &Uuid) -> Result<Option<LearningRequest>, StoreError> {
        match self.requests.get(request_key(id).as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn replace_request(&self, request: &LearningRequest) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(request)?;
        self.requests.insert(request_key(&request.id).as_bytes(), bytes)?;
        tracing::debug!(
            target: "oversight::store",
            request_id = %request.id,
            status = %request.status,
            "Request record updated"
        );
        Ok(())
    }

    fn scan_requests(&self) -> Result<Vec<LearningRequest>, StoreError> {
        Self::decode_all(&self.requests, "request")
    }

    fn vault_request(&self, request: &LearningRequest, entry: &VaultEntry) -> Result<(), StoreError> {
        let request_key = request_key(&request.id);
        let request_bytes = serde_json::to_vec(request)?;
        let entry_bytes = serde_json::to_vec(entry)?;
        let exact = entry.fingerprint.exact.as_bytes();

        let result = (&self.requests, &self.vault, &self.vault_fingerprints).transaction(
            |(requests, vault, fingerprints)| {
                for digest in entry.fingerprint.digests() {
                    if fingerprints.get(digest.as_bytes())?.is_some() {
                        return Err(ConflictableTransactionError::Abort(StoreError::VaultConflict));
                    }
                }
                vault.insert(exact, entry_bytes.as_slice())?;
                for digest in entry.fingerprint.digests() {
                    fingerprints.insert(digest.as_bytes(), exact)?;
                }
                requests.insert(request_key.as_bytes(), request_bytes.as_slice())?;
                Ok(())
            },
        );

        match result {
            Ok(()) => {
                tracing::info!(
                    target: "oversight::vault",
                    request_id = %request.id,
                    fingerprint = %entry.fingerprint.exact,
                    "Vault entry appended"
                );
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StoreError::Sled(e)),
        }
    }

    fn vault_matches(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        for digest in fingerprint.digests() {
            if self.vault_fingerprints.contains_key(digest.as_bytes())? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn scan_vault(&self) -> Result<Vec<VaultEntry>, StoreError> {
        Self::decode_all(&self.vault, "vault")
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::{NewRequest, RequestStatus};

    fn pending(content: &str) -> LearningRequest {
        LearningRequest::pending(NewRequest::new("t", content), Fingerprint::of(content), 1)
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let store = SledRequestStore::temporary().unwrap();
        let req = pending("a");
        store.insert_request(&req).unwrap();
        assert!(matches!(store.insert_request(&req), Err(StoreError::AlreadyExists)));
        assert_eq!(store.get_request(&req.id).unwrap(), Some(req));
    }

    #[test]
    fn vaulting_writes_request_and_entry_together() {
        let store = SledRequestStore::temporary().unwrap();
        let mut req = pending("Python 3.14 ships faster startup");
        store.insert_request(&req).unwrap();
        let entry = req.deny("not relevant", 2).unwrap();
        store.vault_request(&req, &entry).unwrap();

        let stored = store.get_request(&req.id).unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Vaulted);
        assert_eq!(store.scan_vault().unwrap(), vec![entry]);
        assert!(store
            .vault_matches(&Fingerprint::of("python 3.14   ships FASTER startup"))
            .unwrap());
        assert!(!store.vault_matches(&Fingerprint::of("something else")).unwrap());
    }

    #[test]
    fn vault_is_write_once_per_fingerprint() {
        let store = SledRequestStore::temporary().unwrap();
        let mut first = pending("same words");
        let entry = first.deny("no", 2).unwrap();
        store.vault_request(&first, &entry).unwrap();

        let mut second = pending("SAME words");
        store.insert_request(&second).unwrap();
        let again = second.deny("no", 3).unwrap();
        assert!(matches!(
            store.vault_request(&second, &again),
            Err(StoreError::VaultConflict)
        ));
        // aborted transaction leaves the second request untouched
        let stored = store.get_request(&second.id).unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
        assert_eq!(store.scan_vault().unwrap().len(), 1);
    }

    #[test]
    fn records_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests");
        let mut req = pending("durable");
        {
            let store = SledRequestStore::open_path(&path).unwrap();
            store.insert_request(&req).unwrap();
            let entry = req.deny("no", 2).unwrap();
            store.vault_request(&req, &entry).unwrap();
            store.flush().unwrap();
        }
        let store = SledRequestStore::open_path(&path).unwrap();
        assert_eq!(store.scan_requests().unwrap().len(), 1);
        assert!(store.vault_matches(&Fingerprint::of("durable")).unwrap());
    }
}
