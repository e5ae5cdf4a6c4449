//! In-memory store of per-user dynamic grants.

use dashmap::DashMap;
use time::OffsetDateTime;

use crate::types::DynamicPermission;

/// Concurrent map of user id → grants, in grant order.
///
/// Expired grants are kept until removed explicitly; readers filter them
/// with [`active_at`](Self::active_at).
#[derive(Debug, Default)]
pub struct DynamicGrantStore {
    grants: DashMap<String, Vec<DynamicPermission>>,
}

impl DynamicGrantStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a grant to its user's list.
    pub fn add(&self, grant: DynamicPermission) {
        self.grants
            .entry(grant.user_id.clone())
            .or_default()
            .push(grant);
    }

    /// Remove every grant of `user_id` for exactly `(resource, action)`.
    ///
    /// Returns the number of grants removed.
    pub fn remove(&self, user_id: &str, resource: &str, action: &str) -> usize {
        let Some(mut entry) = self.grants.get_mut(user_id) else {
            return 0;
        };

        let before = entry.len();
        entry.retain(|g| !(g.permission.resource == resource && g.permission.action == action));
        let removed = before - entry.len();
        let now_empty = entry.is_empty();
        drop(entry);

        if now_empty {
            self.grants.remove_if(user_id, |_, grants| grants.is_empty());
        }
        removed
    }

    /// Remove every grant of `user_id`. Returns the number removed.
    pub fn clear(&self, user_id: &str) -> usize {
        self.grants
            .remove(user_id)
            .map_or(0, |(_, grants)| grants.len())
    }

    /// All grants of `user_id`, including expired ones.
    #[must_use]
    pub fn all(&self, user_id: &str) -> Vec<DynamicPermission> {
        self.grants
            .get(user_id)
            .map(|grants| grants.clone())
            .unwrap_or_default()
    }

    /// Grants of `user_id` that have not expired at `now`.
    #[must_use]
    pub fn active_at(&self, user_id: &str, now: OffsetDateTime) -> Vec<DynamicPermission> {
        self.grants
            .get(user_id)
            .map(|grants| {
                grants
                    .iter()
                    .filter(|g| !g.is_expired_at(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of users holding at least one grant.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.grants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Permission;
    use time::Duration;

    fn grant(user: &str, resource: &str, action: &str, expires: Option<OffsetDateTime>) -> DynamicPermission {
        DynamicPermission::new(user, Permission::new(resource, action), "a1", expires)
    }

    #[test]
    fn test_active_filters_expired() {
        let store = DynamicGrantStore::new();
        let now = OffsetDateTime::now_utc();
        store.add(grant("u9", "medicines", "delete", Some(now - Duration::minutes(1))));
        store.add(grant("u9", "reports", "export", Some(now + Duration::hours(1))));
        store.add(grant("u9", "audit_logs", "view", None));

        let active = store.active_at("u9", now);
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].permission.resource, "reports");
        assert_eq!(store.all("u9").len(), 3);
    }

    #[test]
    fn test_remove_is_exact() {
        let store = DynamicGrantStore::new();
        store.add(grant("u9", "medicines", "delete", None));
        store.add(grant("u9", "medicines", "update", None));

        assert_eq!(store.remove("u9", "medicines", "view"), 0);
        assert_eq!(store.remove("u9", "medicines", "delete"), 1);
        assert_eq!(store.all("u9").len(), 1);
        assert_eq!(store.remove("u9", "medicines", "update"), 1);
        assert_eq!(store.user_count(), 0);
        assert_eq!(store.remove("nobody", "medicines", "update"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_and_read() {
        let store = std::sync::Arc::new(DynamicGrantStore::new());
        let mut writers = Vec::new();
        for w in 0..8 {
            let store = std::sync::Arc::clone(&store);
            writers.push(tokio::spawn(async move {
                for i in 0..50 {
                    let action = if i % 2 == 0 { "export" } else { "generate" };
                    store.add(grant(&format!("u{}", w % 2), "reports", action, None));
                    tokio::task::yield_now().await;
                }
            }));
        }

        let mut readers = Vec::new();
        for _ in 0..4 {
            let store = std::sync::Arc::clone(&store);
            readers.push(tokio::spawn(async move {
                let mut seen = 0;
                for _ in 0..100 {
                    let now = store.active_at("u0", OffsetDateTime::now_utc()).len();
                    assert!(now >= seen, "grant count went backwards: {now} < {seen}");
                    seen = now;
                    tokio::task::yield_now().await;
                }
            }));
        }

        for task in writers.into_iter().chain(readers) {
            task.await.unwrap();
        }
        assert_eq!(store.active_at("u0", OffsetDateTime::now_utc()).len(), 200);
        assert_eq!(store.all("u1").len(), 200);
        assert_eq!(store.user_count(), 2);
    }

    #[test]
    fn test_clear() {
        let store = DynamicGrantStore::new();
        store.add(grant("u1", "reports", "export", None));
        store.add(grant("u1", "reports", "generate", None));
        store.add(grant("u2", "reports", "export", None));

        assert_eq!(store.clear("u1"), 2);
        assert!(store.all("u1").is_empty());
        assert_eq!(store.all("u2").len(), 1);
    }
}
