//! Optional pre-submit screen for proposals (the caller's upstream gate).
//!
//! The registry never consults this; callers that want screening run it before `submit`.

use crate::requests::NewRequest;
use serde::{Deserialize, Serialize};

/// Screening rules applied to a proposal before it reaches the review queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalPolicy {
    /// Categories that are never accepted for review (case-insensitive).
    #[serde(default)]
    pub blocked_categories: Vec<String>,
    /// Keywords that must not appear in title or content, e.g. credentials pasted into a proposal.
    #[serde(default)]
    pub sensitive_keywords: Vec<String>,
}

impl Default for ProposalPolicy {
    fn default() -> Self {
        Self {
            blocked_categories: Vec::new(),
            sensitive_keywords: vec![
                "api_key".to_string(),
                "apikey".to_string(),
                "secret".to_string(),
                "password".to_string(),
                "private key".to_string(),
                "credentials".to_string(),
            ],
        }
    }
}

/// Result of a policy screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    Pass,
    Fail { reason: String },
}

impl ProposalPolicy {
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    pub fn screen(&self, proposal: &NewRequest) -> Screening {
        let category = proposal.category.to_lowercase();
        for blocked in &self.blocked_categories {
            if category == blocked.to_lowercase() {
                return Screening::Fail {
                    reason: format!("category '{}' is blocked by policy", proposal.category),
                };
            }
        }
        let text = format!("{}\n{}", proposal.title, proposal.content).to_lowercase();
        for kw in &self.sensitive_keywords {
            if text.contains(&kw.to_lowercase()) {
                return Screening::Fail {
                    reason: format!("proposal contains sensitive keyword '{}'", kw),
                };
            }
        }
        Screening::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_flags_credentials() {
        let policy = ProposalPolicy::default();
        let leaky = NewRequest::new("Setup", "export API_KEY=abc123");
        assert!(matches!(policy.screen(&leaky), Screening::Fail { .. }));
        let fine = NewRequest::new("Py Release", "Python 3.14 ships faster startup");
        assert_eq!(policy.screen(&fine), Screening::Pass);
    }

    #[test]
    fn blocked_categories_match_case_insensitively() {
        let policy = ProposalPolicy {
            blocked_categories: vec!["Gossip".to_string()],
            sensitive_keywords: Vec::new(),
        };
        let req = NewRequest::new("t", "c").with_category("gossip");
        assert_eq!(
            policy.screen(&req),
            Screening::Fail {
                reason: "category 'gossip' is blocked by policy".to_string()
            }
        );
    }

    #[test]
    fn policy_round_trips_through_bytes() {
        let policy = ProposalPolicy::default();
        let back = ProposalPolicy::from_bytes(&policy.to_bytes()).unwrap();
        assert_eq!(back.sensitive_keywords, policy.sensitive_keywords);
    }
}
