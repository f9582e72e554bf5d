//! Two-tier visibility. Every read in the registry funnels through here.
//!
//! Producers never observe PENDING, DENIED or VAULTED records, nor any vault content.
//! Their only signals are a failed submission and a negative relevance check, and both
//! have the same shape whatever the cause. Reviewers see everything.

use crate::events::DecisionReceiver;
use crate::registry::RegistryStats;
use crate::requests::{LearningRequest, RequestStatus, VaultEntry};
use crate::shared::Role;

pub struct AccessGate;

impl AccessGate {
    /// Whether `role` may see a request in `status`.
    pub fn can_view(role: Role, status: RequestStatus) -> bool {
        match role {
            Role::Reviewer => true,
            Role::Producer => matches!(status, RequestStatus::Approved | RequestStatus::Integrated),
        }
    }

    /// The review queue. Producers get an empty queue no matter what exists.
    pub fn pending_view<E>(
        role: Role,
        pending: impl FnOnce() -> Result<Vec<LearningRequest>, E>,
    ) -> Result<Vec<LearningRequest>, E> {
        match role {
            Role::Reviewer => pending(),
            Role::Producer => Ok(Vec::new()),
        }
    }

    /// A single request. A hidden request is indistinguishable from a missing one.
    pub fn request_view(role: Role, request: Option<LearningRequest>) -> Option<LearningRequest> {
        request.filter(|r| Self::can_view(role, r.status))
    }

    pub fn vault_view<E>(
        role: Role,
        entries: impl FnOnce() -> Result<Vec<VaultEntry>, E>,
    ) -> Result<Vec<VaultEntry>, E> {
        match role {
            Role::Reviewer => entries(),
            Role::Producer => Ok(Vec::new()),
        }
    }

    pub fn stats_view<E>(
        role: Role,
        stats: impl FnOnce() -> Result<RegistryStats, E>,
    ) -> Result<Option<RegistryStats>, E> {
        match role {
            Role::Reviewer => stats().map(Some),
            Role::Producer => Ok(None),
        }
    }

    /// Relevance as the caller may see it. Reviewers may always re-examine anything.
    pub fn relevance(role: Role, vaulted: impl FnOnce() -> bool) -> bool {
        match role {
            Role::Reviewer => true,
            Role::Producer => !vaulted(),
        }
    }

    /// Decision events are a reviewer-side stream; producers get no receiver.
    pub fn event_view(role: Role, subscribe: impl FnOnce() -> DecisionReceiver) -> Option<DecisionReceiver> {
        match role {
            Role::Reviewer => Some(subscribe()),
            Role::Producer => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_sees_only_accepted_records() {
        for status in [RequestStatus::Pending, RequestStatus::Denied, RequestStatus::Vaulted] {
            assert!(!AccessGate::can_view(Role::Producer, status));
            assert!(AccessGate::can_view(Role::Reviewer, status));
        }
        assert!(AccessGate::can_view(Role::Producer, RequestStatus::Integrated));
        assert!(AccessGate::can_view(Role::Producer, RequestStatus::Approved));
    }

    #[test]
    fn producer_views_never_evaluate_the_source() {
        let pending =
            AccessGate::pending_view::<()>(Role::Producer, || panic!("queue read for producer")).unwrap();
        assert!(pending.is_empty());
        let vault = AccessGate::vault_view::<()>(Role::Producer, || panic!("vault read for producer")).unwrap();
        assert!(vault.is_empty());
        let stats = AccessGate::stats_view::<()>(Role::Producer, || panic!("stats read for producer")).unwrap();
        assert!(stats.is_none());
    }

    #[test]
    fn reviewer_relevance_is_unconditional() {
        assert!(AccessGate::relevance(Role::Reviewer, || true));
        assert!(!AccessGate::relevance(Role::Producer, || true));
        assert!(AccessGate::relevance(Role::Producer, || false));
    }

    #[test]
    fn producers_get_no_event_stream() {
        let (tx, _) = tokio::sync::broadcast::channel(4);
        assert!(AccessGate::event_view(Role::Producer, || panic!("must not subscribe")).is_none());
        assert!(AccessGate::event_view(Role::Reviewer, || tx.subscribe()).is_some());
    }
}
