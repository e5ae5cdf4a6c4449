//! Decision and snapshot caching.
//!
//! [`PermissionCache`] wraps a [`CacheBackend`] with the engine's policy:
//!
//! - every backend call is bounded by `operation_timeout`
//! - reads and writes fail open: an error or timeout is logged and the
//!   caller computes the decision directly
//! - invalidations propagate errors, since a grant or revoke must not report
//!   success while stale decisions survive
//! - a disabled cache is a pass-through with identical call-site semantics
//!
//! A decision that depends on an expiring grant is never cached past the
//! grant's expiry.
//!
//! Invalidating a user or role also bumps its generation, which is part of
//! every key (see [`keys`]). A check that computed its decision before the
//! change may still store it afterwards, but under a key no later lookup
//! reads, so a revoked grant can never be served again.

pub mod backend;
pub mod keys;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use backend::{CacheBackend, CacheStats, CacheValue, LocalCacheBackend, NoOpCacheBackend};
pub use keys::{
    KeyEpoch, decision_key, escape_segment, glob_to_regex, role_pattern, snapshot_key, user_pattern,
};

use crate::AuthzResult;
use crate::config::CacheConfig;
use crate::error::AuthzError;
use crate::policy::PermissionSnapshot;
use crate::types::{AuthenticatedUser, PermissionCheckResult, Role};

/// Per-user and per-role mutation counters.
#[derive(Debug, Default)]
struct Generations {
    users: DashMap<String, u64>,
    roles: DashMap<Role, u64>,
}

/// Policy layer over a cache backend.
#[derive(Clone)]
pub struct PermissionCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    generations: Arc<Generations>,
}

impl std::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("config", &self.config)
            .field("stats", &self.backend.stats())
            .finish()
    }
}

impl PermissionCache {
    /// Wrap `backend`. A disabled configuration replaces it with a no-op backend.
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        let backend = if config.enabled {
            backend
        } else {
            Arc::new(NoOpCacheBackend)
        };
        Self {
            backend,
            config,
            generations: Arc::default(),
        }
    }

    /// Cache on a fresh local backend.
    #[must_use]
    pub fn local(config: CacheConfig) -> Self {
        Self::new(Arc::new(LocalCacheBackend::new()), config)
    }

    /// Pass-through cache.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(
            Arc::new(NoOpCacheBackend),
            CacheConfig {
                enabled: false,
                ..CacheConfig::default()
            },
        )
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.backend.stats()
    }

    /// Current key epoch of `user`. Read it before computing a decision.
    #[must_use]
    pub fn epoch(&self, user: &AuthenticatedUser) -> KeyEpoch {
        KeyEpoch {
            user: self.generations.users.get(&user.id).map_or(0, |g| *g),
            role: self.generations.roles.get(&user.role).map_or(0, |g| *g),
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = AuthzResult<T>>,
    ) -> AuthzResult<T> {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AuthzError::cache(format!(
                "{operation} timed out after {:?}",
                self.config.operation_timeout
            ))),
        }
    }

    // -------------------------------------------------------------------------
    // Fail-open reads and writes
    // -------------------------------------------------------------------------

    /// Get an entry. Backend failures are logged and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        match self.bounded("get", self.backend.get(key)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, computing directly");
                None
            }
        }
    }

    /// Store an entry. Backend failures are logged and ignored.
    pub async fn set(&self, key: String, value: CacheValue, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let log_key = key.clone();
        if let Err(e) = self.bounded("set", self.backend.set(key, value, ttl)).await {
            warn!(key = %log_key, error = %e, "Cache write failed, continuing uncached");
        }
    }

    /// Cached decision under `key`, if any.
    pub async fn get_decision(&self, key: &str) -> Option<PermissionCheckResult> {
        match self.get(key).await? {
            CacheValue::Decision(result) => Some(result),
            CacheValue::Snapshot(_) => None,
        }
    }

    /// Cache a decision for the decision TTL, capped at its validity window.
    pub async fn set_decision(&self, key: String, result: &PermissionCheckResult) {
        let ttl = capped_ttl(self.config.decision_ttl, result.valid_until);
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Caching decision");
        self.set(key, CacheValue::Decision(result.clone()), ttl).await;
    }

    /// Cached permission snapshot under `key`, if any.
    pub async fn get_snapshot(&self, key: &str) -> Option<PermissionSnapshot> {
        match self.get(key).await? {
            CacheValue::Snapshot(snapshot) => Some(snapshot),
            CacheValue::Decision(_) => None,
        }
    }

    /// Cache a snapshot for the snapshot TTL, capped at its earliest grant expiry.
    pub async fn set_snapshot(&self, key: String, snapshot: &PermissionSnapshot) {
        let ttl = capped_ttl(self.config.snapshot_ttl, snapshot.valid_until);
        self.set(key, CacheValue::Snapshot(snapshot.clone()), ttl).await;
    }

    // -------------------------------------------------------------------------
    // Invalidation
    // -------------------------------------------------------------------------

    /// Remove one entry.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Cache` if the backend fails or times out.
    pub async fn invalidate(&self, key: &str) -> AuthzResult<bool> {
        self.bounded("invalidate", self.backend.invalidate(key)).await
    }

    /// Remove every entry matching the glob `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Cache` if the backend fails or times out.
    pub async fn invalidate_pattern(&self, pattern: &str) -> AuthzResult<usize> {
        let removed = self
            .bounded("invalidate_pattern", self.backend.invalidate_pattern(pattern))
            .await?;
        debug!(pattern, removed, "Cache entries invalidated");
        Ok(removed)
    }

    /// Retire every entry of `user_id`: bump its generation, then remove the
    /// stored entries. Call after the grant change is visible.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Cache` if the backend fails or times out. The
    /// generation has moved on regardless, so old entries are never read.
    pub async fn invalidate_user(&self, user_id: &str) -> AuthzResult<usize> {
        *self
            .generations
            .users
            .entry(user_id.to_string())
            .or_default() += 1;
        self.invalidate_pattern(&user_pattern(user_id)).await
    }

    /// Retire every entry computed for `role`. Call after the catalog edit is
    /// visible.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Cache` if the backend fails or times out. The
    /// generation has moved on regardless, so old entries are never read.
    pub async fn invalidate_role(&self, role: Role) -> AuthzResult<usize> {
        *self.generations.roles.entry(role).or_default() += 1;
        self.invalidate_pattern(&role_pattern(role)).await
    }

    /// Remove everything.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Cache` if the backend fails or times out.
    pub async fn clear(&self) -> AuthzResult<()> {
        self.bounded("clear", self.backend.clear()).await
    }

    /// Start the periodic expired-entry sweep.
    pub fn start_cleanup_task(&self) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let period = self.config.cleanup_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = backend.cleanup_expired();
                if removed > 0 {
                    debug!(removed, "Expired cache entries removed");
                }
            }
        })
    }
}

/// `ttl`, shortened so the entry expires no later than `until`.
///
/// Returns zero when `until` has already passed.
fn capped_ttl(ttl: Duration, until: Option<OffsetDateTime>) -> Duration {
    match until {
        None => ttl,
        Some(until) => {
            let remaining = until - OffsetDateTime::now_utc();
            Duration::try_from(remaining).map_or(Duration::ZERO, |r| ttl.min(r))
        }
    }
}
