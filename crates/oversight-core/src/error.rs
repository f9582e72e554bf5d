//! Error taxonomy for the oversight core.

use crate::requests::RequestStatus;
use thiserror::Error;

/// Failures returned by [`crate::RequestRegistry`] operations. All are local and recoverable.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Submission matches an existing request or a vault entry. Deliberately carries no cause.
    #[error("content not accepted")]
    DuplicateContent,

    #[error("request not found")]
    NotFound,

    /// A decision (or integration retry) was attempted on a request in the wrong state.
    #[error("request is {0}, not eligible for this operation")]
    InvalidState(RequestStatus),

    /// The downstream knowledge store rejected or could not take the write. The request stays APPROVED.
    #[error("knowledge store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Persistence-layer failures from a [`crate::RequestStore`] backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),

    #[error("record codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("request id already exists")]
    AlreadyExists,

    /// The vault is write-once; an entry for one of the fingerprints is already present.
    #[error("vault entry already exists for fingerprint")]
    VaultConflict,

    #[error("store lock poisoned")]
    Poisoned,
}

/// Failure reported by a knowledge sink.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct SinkError(pub String);

impl From<sled::Error> for SinkError {
    fn from(e: sled::Error) -> Self {
        Self(e.to_string())
    }
}
