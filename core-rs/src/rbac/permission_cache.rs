//! Permission cache backing all authorization decisions
//!
//! Cache-aside over a [`RoleStore`] with a fixed TTL per entry:
//! - hit: the snapshot is returned as long as `now <= expires_at`
//! - miss or expired: exactly one store load for this lookup, stored with `now + ttl`
//! - store failure: propagated as [`CoreError::StoreUnavailable`], nothing cached
//!
//! Concurrent misses for the same role may each load. An invalidation that races
//! an in-flight load can be overwritten by that load's result; the entry is then
//! stale until the TTL runs out or the role is invalidated again.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::permission::{is_granted, FeaturePermissions, PermissionLevel, RoleId};
use super::store::RoleStore;
use crate::clock::Clock;
use crate::config::PermissionCacheConfig;
use crate::errors::{CoreError, Result};

/// Snapshot of one role's permissions with its expiry
#[derive(Debug, Clone)]
pub struct PermissionCacheEntry {
    pub role_id: RoleId,
    pub permissions: Arc<FeaturePermissions>,
    pub loaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PermissionCacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub invalidations: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    invalidations: AtomicU64,
}

/// Time-bounded, invalidate-able cache of per-role permission mappings.
///
/// Safe to share behind an `Arc`; all operations take `&self`.
pub struct PermissionCache {
    store: Arc<dyn RoleStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: DashMap<RoleId, PermissionCacheEntry>,
    counters: Counters,
}

impl std::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("store", &"<RoleStore>")
            .field("clock", &"<Clock>")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl PermissionCache {
    pub fn new(store: Arc<dyn RoleStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        PermissionCache {
            store,
            clock,
            ttl,
            entries: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn from_config(store: Arc<dyn RoleStore>, clock: Arc<dyn Clock>, config: &PermissionCacheConfig) -> Self {
        Self::new(store, clock, config.ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Check whether `role_id` may perform an action needing `required` on `feature`.
    ///
    /// # Returns
    /// `Ok(true)` iff the role's mapping contains `feature` at a level that satisfies
    /// `required`. Unknown roles, absent features and empty feature names are
    /// `Ok(false)`.
    ///
    /// # Errors
    /// [`CoreError::StoreUnavailable`] when the mapping had to be loaded and the store
    /// failed. Callers must treat this as deny.
    pub async fn has_permission(&self, role_id: &RoleId, feature: &str, required: PermissionLevel) -> Result<bool> {
        if feature.is_empty() {
            debug!(role_id = %role_id, "[PermissionCache] Empty feature name, denying");
            return Ok(false);
        }

        let permissions = self.permissions_for(role_id).await?;
        let granted = is_granted(&permissions, feature, required);

        debug!(
            role_id = %role_id,
            feature,
            required = %required,
            granted,
            "[PermissionCache] Authorization decision"
        );

        Ok(granted)
    }

    /// Resolve the role's permission snapshot, loading it on miss or expiry
    pub async fn permissions_for(&self, role_id: &RoleId) -> Result<Arc<FeaturePermissions>> {
        if let Some(permissions) = self.lookup(role_id, self.clock.now()) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(permissions);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        self.load(role_id).await
    }

    /// Drop the cached entry for `role_id`. No-op if nothing is cached.
    pub fn invalidate_role(&self, role_id: &RoleId) {
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);

        if self.entries.remove(role_id).is_some() {
            debug!(role_id = %role_id, "[PermissionCache] Invalidated role");
        }
    }

    pub fn invalidate_all(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!(dropped, "[PermissionCache] Invalidated all roles");
    }

    /// Current entry for `role_id`, expired or not
    pub fn cached_entry(&self, role_id: &RoleId) -> Option<PermissionCacheEntry> {
        self.entries.get(role_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            load_failures: self.counters.load_failures.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    fn lookup(&self, role_id: &RoleId, now: DateTime<Utc>) -> Option<Arc<FeaturePermissions>> {
        // Shard guard must be released before remove_if touches the same shard.
        let expired_at = {
            let entry = self.entries.get(role_id)?;
            if !entry.is_expired(now) {
                return Some(Arc::clone(&entry.permissions));
            }
            entry.expires_at
        };

        // Only drop the entry we saw; a concurrent refresh may already have replaced it.
        self.entries
            .remove_if(role_id, |_, entry| entry.expires_at == expired_at);

        debug!(role_id = %role_id, expired_at = %expired_at, "[PermissionCache] Entry expired");
        None
    }

    async fn load(&self, role_id: &RoleId) -> Result<Arc<FeaturePermissions>> {
        self.counters.loads.fetch_add(1, Ordering::Relaxed);

        let permissions = match self.store.get_permissions(role_id).await {
            Ok(permissions) => Arc::new(permissions),
            Err(e) => {
                self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
                warn!(role_id = %role_id, error = %e, "[PermissionCache] Role store load failed, failing closed");

                return Err(match e {
                    CoreError::StoreUnavailable(_) => e,
                    other => CoreError::StoreUnavailable(other.to_string()),
                });
            }
        };

        let loaded_at = self.clock.now();
        // Saturate instead of overflowing for TTLs that run past the calendar's end.
        let expires_at = loaded_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = PermissionCacheEntry {
            role_id: *role_id,
            permissions: Arc::clone(&permissions),
            loaded_at,
            expires_at,
        };

        debug!(
            role_id = %role_id,
            features = permissions.len(),
            expires_at = %entry.expires_at,
            "[PermissionCache] Loaded role permissions"
        );

        self.entries.insert(*role_id, entry);
        Ok(permissions)
    }
}
