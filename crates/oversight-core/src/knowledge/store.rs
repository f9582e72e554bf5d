//! Sled-backed knowledge base that approved learning requests are written into.
//!
//! One tree, `knowledge`, keyed `{category}/{content fingerprint}`. Values are JSON [`KbRecord`]s
//! whose metadata carries `category`, `source`, `tags` and the originating `request_id`.

use super::{KnowledgeItem, KnowledgeSink, StoreOutcome};
use crate::error::SinkError;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use uuid::Uuid;

const KNOWLEDGE_TREE: &str = "knowledge";
/// Category used when a request arrives without one.
const UNCATEGORIZED: &str = "uncategorized";

/// Standard record structure for knowledge entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbRecord {
    /// Unique identifier for this record.
    pub id: Uuid,
    /// The learned content.
    pub content: String,
    /// Reserved keys: `category`, `source`, `tags`, `request_id`.
    pub metadata: serde_json::Value,
    /// Unix timestamp (milliseconds) when this record was written.
    pub timestamp: i64,
}

impl KbRecord {
    /// Creates a new KbRecord with content and metadata.
    pub fn with_metadata(content: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            metadata,
            timestamp: crate::shared::now_ms(),
        }
    }

    /// Serializes this record to JSON bytes for storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Deserializes a record from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    pub fn category(&self) -> Option<&str> {
        self.metadata.get("category").and_then(|v| v.as_str())
    }

    pub fn tags(&self) -> Vec<String> {
        self.metadata
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }
}

/// Status information for the knowledge tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbStatus {
    pub tree_name: String,
    pub connected: bool,
    pub entry_count: usize,
    pub error: Option<String>,
}

/// Knowledge store on a single Sled tree.
pub struct KnowledgeStore {
    db: Db,
}

impl KnowledgeStore {
    /// Opens or creates the knowledge DB at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Category as stored: trimmed, blank becomes [`UNCATEGORIZED`].
    fn category_label(category: &str) -> &str {
        match category.trim() {
            "" => UNCATEGORIZED,
            trimmed => trimmed,
        }
    }

    fn record_key(category: &str, key: &str) -> String {
        format!("{}/{}", Self::category_label(category), key)
    }

    /// Inserts `record` at `{category}/{key}` only if nothing is stored there yet.
    pub fn insert_if_absent(&self, category: &str, key: &str, record: &KbRecord) -> Result<StoreOutcome, sled::Error> {
        let tree = self.db.open_tree(KNOWLEDGE_TREE)?;
        let full_key = Self::record_key(category, key);
        let bytes = record.to_bytes();
        let outcome = match tree.compare_and_swap(full_key.as_bytes(), None as Option<&[u8]>, Some(bytes.as_slice()))? {
            Ok(()) => StoreOutcome::Inserted,
            Err(_) => StoreOutcome::AlreadyPresent,
        };

        tracing::info!(
            target: "oversight::knowledge",
            key = %full_key,
            bytes = bytes.len(),
            action = if outcome == StoreOutcome::Inserted { "INSERT" } else { "SKIP" },
            "Knowledge key '{}' {}",
            full_key,
            if outcome == StoreOutcome::Inserted { "inserted" } else { "already present" }
        );
        Ok(outcome)
    }

    /// Retrieves the record stored for `key` under `category`.
    pub fn get_record(&self, category: &str, key: &str) -> Result<Option<KbRecord>, sled::Error> {
        let tree = self.db.open_tree(KNOWLEDGE_TREE)?;
        let v = tree.get(Self::record_key(category, key).as_bytes())?;
        Ok(v.and_then(|iv| KbRecord::from_bytes(&iv)))
    }

    /// Returns all records in a category, oldest first. Categories nested under this one
    /// (`tech/rust` for `tech`) share the key prefix and are filtered out.
    pub fn scan_category(&self, category: &str) -> Result<Vec<KbRecord>, sled::Error> {
        let tree = self.db.open_tree(KNOWLEDGE_TREE)?;
        let label = Self::category_label(category);
        let prefix = Self::record_key(category, "");
        let mut out = Vec::new();
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            if let Some(rec) = KbRecord::from_bytes(&v).filter(|r| r.category() == Some(label)) {
                out.push(rec);
            }
        }
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }

    /// Returns the number of knowledge entries.
    pub fn count(&self) -> Result<usize, sled::Error> {
        Ok(self.db.open_tree(KNOWLEDGE_TREE)?.len())
    }

    pub fn get_status(&self) -> KbStatus {
        match self.db.open_tree(KNOWLEDGE_TREE) {
            Ok(tree) => KbStatus {
                tree_name: KNOWLEDGE_TREE.to_string(),
                connected: true,
                entry_count: tree.len(),
                error: None,
            },
            Err(e) => KbStatus {
                tree_name: KNOWLEDGE_TREE.to_string(),
                connected: false,
                entry_count: 0,
                error: Some(e.to_string()),
            },
        }
    }
}

impl KnowledgeSink for KnowledgeStore {
    fn store(&self, item: &KnowledgeItem) -> Result<StoreOutcome, SinkError> {
        let metadata = serde_json::json!({
            "category": Self::category_label(&item.category),
            "source": item.source,
            "tags": item.tags,
            "request_id": item.request_id,
        });
        let record = KbRecord::with_metadata(item.content.clone(), metadata);
        Ok(self.insert_if_absent(&item.category, &item.key, &record)?)
    }
}
