//! Shared types used across the oversight crates: caller roles, priorities, and configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Sub-directory (under `storage_path`) holding the request store and vault.
pub const REQUESTS_DIR: &str = "oversight_requests";
/// Sub-directory (under `storage_path`) holding the knowledge base approved content lands in.
pub const KNOWLEDGE_DIR: &str = "oversight_knowledge";

/// The two caller roles. Every read path takes one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The automated discovery process proposing knowledge.
    Producer,
    /// The human deciding what the agent may learn.
    Reviewer,
}

impl Role {
    /// Parses a role label. Anything that is not exactly a reviewer label is a producer.
    pub fn parse(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("reviewer") {
            Self::Reviewer
        } else {
            Self::Producer
        }
    }

    #[inline]
    pub fn is_reviewer(&self) -> bool {
        matches!(self, Self::Reviewer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer => f.write_str("producer"),
            Self::Reviewer => f.write_str("reviewer"),
        }
    }
}

/// Advisory priority supplied by the producer. Only affects review ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    /// Case-insensitive parse; returns None for unknown labels.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Accepts any casing (`"HIGH"`, `"High"`), unlike the snake_case serializer.
impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Self::parse(&label).ok_or_else(|| {
            serde::de::Error::unknown_variant(&label, &["low", "medium", "high", "critical"])
        })
    }
}

/// Current wall clock as Unix milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Global application configuration (gateway identity + storage). Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application identity reported by the gateway status route.
    pub app_name: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// Base directory for Sled DBs (request store and knowledge store paths are derived from this).
    pub storage_path: String,
    /// Buffer size of the decision event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// If true, the gateway screens proposals with [`crate::ProposalPolicy`] before submitting them.
    #[serde(default = "default_true")]
    pub policy_screening: bool,
}

fn default_event_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_name: "Learning Oversight".to_string(),
            port: 8040,
            storage_path: "./data".to_string(),
            event_capacity: default_event_capacity(),
            policy_screening: true,
        }
    }
}

impl CoreConfig {
    /// Load config from file and environment. Precedence: env `OVERSIGHT_CONFIG` path > `config/oversight.toml` > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("OVERSIGHT_CONFIG").unwrap_or_else(|_| "config/oversight.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load config from the given file (skipped if missing), then `OVERSIGHT__*` environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("app_name", defaults.app_name)?
            .set_default("port", defaults.port as i64)?
            .set_default("storage_path", defaults.storage_path)?
            .set_default("event_capacity", defaults.event_capacity as i64)?
            .set_default("policy_screening", defaults.policy_screening)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("OVERSIGHT").separator("__"))
            .build()?;

        built.try_deserialize()
    }

    /// Directory of the request store and vault.
    pub fn requests_path(&self) -> PathBuf {
        Path::new(&self.storage_path).join(REQUESTS_DIR)
    }

    /// Directory of the knowledge store.
    pub fn knowledge_path(&self) -> PathBuf {
        Path::new(&self.storage_path).join(KNOWLEDGE_DIR)
    }
}
