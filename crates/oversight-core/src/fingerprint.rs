//! Content fingerprints used for duplicate and vault matching.
//!
//! Two SHA-256 digests per content string:
//! - `exact`: the bytes as given (catches verbatim resubmission),
//! - `normalized`: after lower-casing, collapsing whitespace runs to one space and trimming
//!   (catches resubmission with only casing/whitespace changes).
//!
//! This is not similarity matching; paraphrases produce unrelated digests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest pair computed once at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub exact: String,
    pub normalized: String,
}

impl Fingerprint {
    /// Fingerprints `content`. Pure; defined for every string including the empty one.
    pub fn of(content: &str) -> Self {
        Self {
            exact: digest(content),
            normalized: digest(&normalize(content)),
        }
    }

    /// True if either digest equals the counterpart digest of `other`.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.exact == other.exact || self.normalized == other.normalized
    }

    /// Single-writer key for submissions. Equal exact digests imply equal normalized digests,
    /// so every pair of contents that could collide shares this key.
    #[inline]
    pub fn lock_key(&self) -> &str {
        &self.normalized
    }

    /// Both digests, for index and vault lookups.
    pub fn digests(&self) -> [&str; 2] {
        [&self.exact, &self.normalized]
    }
}

/// Lower-case, collapse whitespace runs to a single space, trim.
pub fn normalize(content: &str) -> String {
    content
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprinting_is_deterministic() {
        let c = "Python 3.14 ships faster startup";
        assert_eq!(Fingerprint::of(c), Fingerprint::of(c));
    }

    #[test]
    fn case_and_whitespace_variants_share_normalized_digest() {
        let a = Fingerprint::of("Hello  World");
        let b = Fingerprint::of("hello world");
        assert_eq!(a.normalized, b.normalized);
        assert_ne!(a.exact, b.exact);
        assert!(a.matches(&b));
    }

    #[test]
    fn normalization_trims_and_collapses_all_whitespace_kinds() {
        assert_eq!(normalize("  Python\t3.14 \n\n ships  "), "python 3.14 ships");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \t\n"), "");
    }

    #[test]
    fn empty_content_has_well_defined_pair() {
        let fp = Fingerprint::of("");
        // SHA-256 of the empty string
        assert_eq!(
            fp.exact,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(fp.exact, fp.normalized);
        assert_eq!(fp.exact.len(), 64);
    }

    #[test]
    fn different_content_does_not_match() {
        let a = Fingerprint::of("content A");
        let b = Fingerprint::of("content B");
        assert!(!a.matches(&b));
    }
}
