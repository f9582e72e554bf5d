//! oversight-core: human-in-the-loop gate between what an agent proposes to learn and what it
//! actually stores.
//!
//! Producers submit [`NewRequest`]s; reviewers approve (content flows to the knowledge store) or
//! deny (content fingerprints go to a write-once vault and can never come back). All reads go
//! through [`AccessGate`], so producers only ever learn "accepted" or "not accepted".

mod error;
mod events;
mod fingerprint;
mod gate;
mod knowledge;
mod policy;
mod registry;
mod requests;
mod shared;

pub use error::{RegistryError, SinkError, StoreError};
pub use events::{DecisionEvent, DecisionKind, DecisionReceiver};
pub use fingerprint::{normalize, Fingerprint};
pub use gate::AccessGate;
pub use knowledge::{
    IntegrationBridge, KbRecord, KbStatus, KnowledgeItem, KnowledgeSink, KnowledgeStore, StoreOutcome,
};
pub use policy::{ProposalPolicy, Screening};
pub use registry::{RegistryStats, RequestRegistry};
pub use requests::{
    IndexEntry, LearningRequest, MemoryRequestStore, NewRequest, RequestIndex, RequestStatus, RequestStore,
    SledRequestStore, VaultEntry,
};
pub use shared::{now_ms, CoreConfig, Priority, Role, KNOWLEDGE_DIR, REQUESTS_DIR};
