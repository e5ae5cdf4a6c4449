//! Cache backends.
//!
//! [`CacheBackend`] abstracts the store so a shared backend can replace the
//! in-process map without touching the authorization service. Only a local
//! `DashMap` backend and a no-op backend ship with the crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;

use super::keys::glob_to_regex;
use crate::AuthzResult;
use crate::policy::PermissionSnapshot;
use crate::types::PermissionCheckResult;

/// A cached value.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Decision(PermissionCheckResult),
    Snapshot(PermissionSnapshot),
}

/// Store of cache values with per-entry TTL.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a live entry. Expired entries are treated as absent.
    async fn get(&self, key: &str) -> AuthzResult<Option<CacheValue>>;

    /// Store an entry for `ttl`.
    async fn set(&self, key: String, value: CacheValue, ttl: Duration) -> AuthzResult<()>;

    /// Remove one entry. Returns `true` if it existed.
    async fn invalidate(&self, key: &str) -> AuthzResult<bool>;

    /// Remove every entry whose key matches the glob `pattern`.
    /// Returns the number removed.
    async fn invalidate_pattern(&self, pattern: &str) -> AuthzResult<usize>;

    /// Remove everything.
    async fn clear(&self) -> AuthzResult<()>;

    /// Statistics for monitoring.
    fn stats(&self) -> CacheStats;

    /// Drop expired entries. Backends with native TTL need not override this.
    fn cleanup_expired(&self) -> usize {
        0
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored.
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped because their TTL elapsed.
    pub evictions: u64,
    /// Entries dropped by invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Hit rate as a percentage.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

// =============================================================================
// Local Backend
// =============================================================================

#[derive(Debug)]
struct CachedEntry {
    value: CacheValue,
    cached_at: Instant,
    expires_at: Instant,
}

/// In-process backend on a `DashMap`.
#[derive(Debug, Default)]
pub struct LocalCacheBackend {
    entries: DashMap<String, CachedEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl LocalCacheBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Age of an entry, if present.
    #[must_use]
    pub fn entry_age(&self, key: &str) -> Option<Duration> {
        self.entries.get(key).map(|e| e.cached_at.elapsed())
    }

    /// Keys currently stored, sorted. Includes entries awaiting cleanup.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort_unstable();
        keys
    }
}

#[async_trait]
impl CacheBackend for LocalCacheBackend {
    async fn get(&self, key: &str) -> AuthzResult<Option<CacheValue>> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            // A concurrent set may have replaced the entry since the read.
            if self
                .entries
                .remove_if(key, |_, e| e.expires_at <= now)
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, key: String, value: CacheValue, ttl: Duration) -> AuthzResult<()> {
        let now = Instant::now();
        self.entries.insert(
            key,
            CachedEntry {
                value,
                cached_at: now,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> AuthzResult<bool> {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    async fn invalidate_pattern(&self, pattern: &str) -> AuthzResult<usize> {
        let matcher = glob_to_regex(pattern)?;
        let mut removed = 0;

        self.entries.retain(|key, _| {
            if matcher.is_match(key) {
                removed += 1;
                false
            } else {
                true
            }
        });

        self.invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }

    async fn clear(&self) -> AuthzResult<()> {
        self.entries.clear();
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            if entry.expires_at <= now {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }
}

// =============================================================================
// No-op Backend
// =============================================================================

/// Backend that stores nothing. Every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCacheBackend;

#[async_trait]
impl CacheBackend for NoOpCacheBackend {
    async fn get(&self, _key: &str) -> AuthzResult<Option<CacheValue>> {
        Ok(None)
    }

    async fn set(&self, _key: String, _value: CacheValue, _ttl: Duration) -> AuthzResult<()> {
        Ok(())
    }

    async fn invalidate(&self, _key: &str) -> AuthzResult<bool> {
        Ok(false)
    }

    async fn invalidate_pattern(&self, _pattern: &str) -> AuthzResult<usize> {
        Ok(0)
    }

    async fn clear(&self) -> AuthzResult<()> {
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}
