//! Registry of connected presence sessions.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, RwLock};

use backoffice_common::PresenceRecord;

const EVENT_CAPACITY: usize = 64;

/// Live presence sessions keyed by session id.
///
/// Every change broadcasts the deduplicated member list to subscribers.
pub struct PresenceRegistry {
    sessions: RwLock<HashMap<String, PresenceRecord>>,
    events: broadcast::Sender<Vec<PresenceRecord>>,
    liveness_window: Duration,
}

impl PresenceRegistry {
    pub fn new(liveness_window: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sessions: RwLock::new(HashMap::new()),
            events,
            liveness_window,
        }
    }

    /// Add or replace a session and broadcast the new membership.
    pub async fn track(&self, session_id: &str, record: PresenceRecord) {
        let members = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session_id.to_string(), record);
            dedup_members(&sessions)
        };
        tracing::debug!("Presence session {} tracked ({} members)", session_id, members.len());
        self.publish(members);
    }

    /// Remove a session. Broadcasts only if the session existed.
    pub async fn untrack(&self, session_id: &str) -> Option<PresenceRecord> {
        let (removed, members) = {
            let mut sessions = self.sessions.write().await;
            let removed = sessions.remove(session_id);
            (removed, dedup_members(&sessions))
        };
        if removed.is_some() {
            tracing::debug!("Presence session {} untracked ({} members)", session_id, members.len());
            self.publish(members);
        }
        removed
    }

    /// Drop every session of a user. Returns how many were removed.
    pub async fn untrack_user(&self, user_id: &str) -> usize {
        let (removed, members) = {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, record| record.id != user_id);
            (before - sessions.len(), dedup_members(&sessions))
        };
        if removed > 0 {
            tracing::debug!("Removed {} presence sessions of {}", removed, user_id);
            self.publish(members);
        }
        removed
    }

    /// One entry per user, earliest session first.
    pub async fn members(&self) -> Vec<PresenceRecord> {
        dedup_members(&*self.sessions.read().await)
    }

    pub async fn is_connected(&self, user_id: &str) -> bool {
        self.sessions.read().await.values().any(|r| r.id == user_id)
    }

    /// Connected and active within the liveness window.
    ///
    /// Activity is the later of `last_active` and the newest session's
    /// `online_at`.
    pub async fn is_online(
        &self,
        user_id: &str,
        last_active: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let latest_session = self
            .sessions
            .read()
            .await
            .values()
            .filter(|r| r.id == user_id)
            .map(|r| r.online_at)
            .max();

        match latest_session {
            Some(online_at) => {
                let activity = last_active.map_or(online_at, |a| a.max(online_at));
                now - activity <= self.liveness_window
            }
            None => false,
        }
    }

    /// Ids of users passing the liveness test, given each user's last activity.
    pub async fn online_users(
        &self,
        users: &[(String, Option<DateTime<Utc>>)],
        now: DateTime<Utc>,
    ) -> HashSet<String> {
        let mut online = HashSet::new();
        for (user_id, last_active) in users {
            if self.is_online(user_id, *last_active, now).await {
                online.insert(user_id.clone());
            }
        }
        online
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<PresenceRecord>> {
        self.events.subscribe()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn publish(&self, members: Vec<PresenceRecord>) {
        // No subscribers is not an error
        let _ = self.events.send(members);
    }
}

fn dedup_members(sessions: &HashMap<String, PresenceRecord>) -> Vec<PresenceRecord> {
    let mut records: Vec<&PresenceRecord> = sessions.values().collect();
    records.sort_by(|a, b| a.online_at.cmp(&b.online_at).then_with(|| a.id.cmp(&b.id)));

    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoffice_common::Role;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
    }

    fn record(user_id: &str, online_at: DateTime<Utc>) -> PresenceRecord {
        PresenceRecord {
            id: user_id.to_string(),
            name: user_id.to_uppercase(),
            email: None,
            role: Role::Employee,
            online_at,
        }
    }

    fn registry() -> PresenceRegistry {
        PresenceRegistry::new(Duration::seconds(120))
    }

    #[tokio::test]
    async fn test_members_dedup_by_user() {
        let registry = registry();
        registry.track("s1", record("alice", t0())).await;
        registry.track("s2", record("alice", t0() + Duration::seconds(5))).await;
        registry.track("s3", record("bob", t0() + Duration::seconds(1))).await;

        let members = registry.members().await;
        let ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);
        assert_eq!(members[0].online_at, t0());
        assert_eq!(registry.session_count().await, 3);
    }

    #[tokio::test]
    async fn test_untrack_keeps_other_sessions() {
        let registry = registry();
        registry.track("s1", record("alice", t0())).await;
        registry.track("s2", record("alice", t0())).await;

        assert!(registry.untrack("s1").await.is_some());
        assert!(registry.is_connected("alice").await);
        assert!(registry.untrack("s2").await.is_some());
        assert!(!registry.is_connected("alice").await);
        assert!(registry.untrack("s2").await.is_none());
    }

    #[tokio::test]
    async fn test_track_broadcasts_sync() {
        let registry = registry();
        let mut rx = registry.subscribe();

        registry.track("s1", record("alice", t0())).await;
        let members = rx.recv().await.unwrap();
        assert_eq!(members.len(), 1);

        registry.untrack("s1").await;
        assert!(rx.recv().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_liveness_expires() {
        let registry = registry();
        registry.track("s1", record("alice", t0())).await;

        assert!(registry.is_online("alice", None, t0() + Duration::seconds(60)).await);
        assert!(!registry.is_online("alice", None, t0() + Duration::seconds(121)).await);

        // A recent heartbeat keeps a long-lived session alive
        let recent = t0() + Duration::minutes(30);
        assert!(registry.is_online("alice", Some(recent), recent + Duration::seconds(30)).await);
    }

    #[tokio::test]
    async fn test_not_online_without_session() {
        let registry = registry();
        assert!(!registry.is_online("alice", Some(t0()), t0()).await);
    }

    #[tokio::test]
    async fn test_online_users() {
        let registry = registry();
        registry.track("s1", record("alice", t0())).await;
        registry.track("s2", record("bob", t0() - Duration::hours(1))).await;

        let users = vec![
            ("alice".to_string(), None),
            ("bob".to_string(), None),
            ("carol".to_string(), Some(t0())),
        ];
        let online = registry.online_users(&users, t0()).await;
        assert_eq!(online.len(), 1);
        assert!(online.contains("alice"));
    }

    #[tokio::test]
    async fn test_untrack_user_drops_all_sessions() {
        let registry = registry();
        registry.track("s1", record("alice", t0())).await;
        registry.track("s2", record("alice", t0())).await;
        registry.track("s3", record("bob", t0())).await;
        let mut rx = registry.subscribe();

        assert_eq!(registry.untrack_user("alice").await, 2);
        assert!(!registry.is_connected("alice").await);
        assert_eq!(registry.session_count().await, 1);
        assert_eq!(rx.recv().await.unwrap().len(), 1);

        assert_eq!(registry.untrack_user("alice").await, 0);
    }
}
