//! DM Eligibility Gate. A user id moves from unknown to writable once and stays there for the
//! life of the process; unknown verdicts are re-derived on every check.

use hono_channels::Transport;
use hono_storage::Directory;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DmReason {
    WroteBefore,
    IsContact,
    /// The account gates incoming messages behind a business intro; writing first is refused.
    BusinessMessagesEnabled,
    Unknown,
}

impl DmReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DmReason::WroteBefore => "wrote_before",
            DmReason::IsContact => "is_contact",
            DmReason::BusinessMessagesEnabled => "business_messages_enabled",
            DmReason::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DmEligibility {
    pub user_id: i64,
    pub can_send: bool,
    pub reason: DmReason,
}

#[derive(Default)]
pub struct DmGate {
    known: Mutex<HashMap<i64, DmReason>>,
}

impl DmGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_writable(&self, user_id: i64) -> bool {
        self.known_reason(user_id).is_some()
    }

    fn known_reason(&self, user_id: i64) -> Option<DmReason> {
        self.known
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .copied()
    }

    /// Records a writable user. The first recorded reason is kept.
    pub fn mark_writable(&self, user_id: i64, reason: DmReason) {
        self.known
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(user_id)
            .or_insert(reason);
    }

    pub fn known_count(&self) -> usize {
        self.known.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn writable(&self, user_id: i64, reason: DmReason) -> DmEligibility {
        self.mark_writable(user_id, reason);
        DmEligibility {
            user_id,
            can_send: true,
            reason,
        }
    }

    /// Known set, then persisted last-seen, then live contact/business status, then live DM
    /// history. Collaborator failures count as "no evidence".
    pub async fn check(&self, user_id: i64, directory: &dyn Directory, transport: &dyn Transport) -> DmEligibility {
        if let Some(reason) = self.known_reason(user_id) {
            return DmEligibility {
                user_id,
                can_send: true,
                reason,
            };
        }

        match directory.user_last_seen(user_id).await {
            Ok(Some(ts)) if ts > 0 => return self.writable(user_id, DmReason::WroteBefore),
            Ok(_) => {}
            Err(e) => debug!(user_id, error = %e, "Last-seen lookup failed"),
        }

        match transport.full_user(user_id).await {
            Ok(full) if full.is_contact => return self.writable(user_id, DmReason::IsContact),
            Ok(full) if full.business_intro => {
                return DmEligibility {
                    user_id,
                    can_send: false,
                    reason: DmReason::BusinessMessagesEnabled,
                }
            }
            Ok(_) => {}
            Err(e) => debug!(user_id, error = %e, "Full user lookup failed"),
        }

        match transport.has_dm_history(user_id).await {
            Ok(true) => return self.writable(user_id, DmReason::WroteBefore),
            Ok(false) => {}
            Err(e) => debug!(user_id, error = %e, "DM history lookup failed"),
        }

        DmEligibility {
            user_id,
            can_send: false,
            reason: DmReason::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hono_channels::testing::FakeTransport;
    use hono_channels::{FullUser, Peer, TransportError};
    use hono_storage::InMemoryStore;

    #[tokio::test]
    async fn test_never_seen_user_is_unknown() {
        let gate = DmGate::new();
        let transport = FakeTransport::new().with_peer(Peer::user(42, "Stranger", None));
        let verdict = gate.check(42, &InMemoryStore::new(), &transport).await;
        assert_eq!(
            verdict,
            DmEligibility {
                user_id: 42,
                can_send: false,
                reason: DmReason::Unknown
            }
        );
        assert!(!gate.is_writable(42));
    }

    #[tokio::test]
    async fn test_negative_verdicts_are_rederived() {
        let gate = DmGate::new();
        let transport = FakeTransport::new().with_peer(Peer::user(42, "Stranger", None));
        let store = InMemoryStore::new();
        gate.check(42, &store, &transport).await;
        let first = transport.call_count();
        gate.check(42, &store, &transport).await;
        assert_eq!(transport.call_count(), first * 2);
    }

    #[tokio::test]
    async fn test_last_seen_makes_writable_without_live_calls() {
        let store = InMemoryStore::new();
        store.seed_user(7, "Ann", None, 1_700_000_000);
        let transport = FakeTransport::new();
        let gate = DmGate::new();
        let verdict = gate.check(7, &store, &transport).await;
        assert!(verdict.can_send);
        assert_eq!(verdict.reason, DmReason::WroteBefore);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_contact_and_business_intro() {
        let mut contact = FullUser::new(Peer::user(1, "C", None));
        contact.is_contact = true;
        let mut business = FullUser::new(Peer::user(2, "B", None));
        business.business_intro = true;
        let transport = FakeTransport::new().with_full_user(contact).with_full_user(business);
        let store = InMemoryStore::new();
        let gate = DmGate::new();

        assert_eq!(gate.check(1, &store, &transport).await.reason, DmReason::IsContact);
        let b = gate.check(2, &store, &transport).await;
        assert!(!b.can_send);
        assert_eq!(b.reason, DmReason::BusinessMessagesEnabled);
        assert!(!transport.called("has_dm_history"));
    }

    #[tokio::test]
    async fn test_history_and_monotonic_once_writable() {
        let transport = FakeTransport::new()
            .with_peer(Peer::user(5, "H", None))
            .with_dm_history(5);
        let store = InMemoryStore::new();
        let gate = DmGate::new();
        assert!(gate.check(5, &store, &transport).await.can_send);

        let calls = transport.call_count();
        for _ in 0..3 {
            let v = gate.check(5, &store, &transport).await;
            assert!(v.can_send);
            assert_eq!(v.reason, DmReason::WroteBefore);
        }
        assert_eq!(transport.call_count(), calls);
    }

    #[tokio::test]
    async fn test_live_failures_are_swallowed() {
        let transport = FakeTransport::new()
            .fail("full_user", TransportError::FloodWait { seconds: 5 })
            .fail("has_dm_history", TransportError::Other("boom".into()));
        let verdict = DmGate::new().check(9, &InMemoryStore::new(), &transport).await;
        assert_eq!(verdict.reason, DmReason::Unknown);
    }

    #[test]
    fn test_mark_writable_keeps_first_reason() {
        let gate = DmGate::new();
        gate.mark_writable(3, DmReason::IsContact);
        gate.mark_writable(3, DmReason::WroteBefore);
        assert_eq!(gate.known_reason(3), Some(DmReason::IsContact));
        assert_eq!(gate.known_count(), 1);
    }
}
