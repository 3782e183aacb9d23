//! Integration tests for the permission cache against real role stores
//!
//! Covers: YAML role file as the authority, TTL expiry, fail-closed behaviour when
//! the file disappears, role management invalidation, and concurrent access.

use adjudication_core::{
    CoreError, FeaturePermissions, InMemoryRoleStore, ManualClock, PermissionCache, PermissionLevel, Role, RoleFile,
    RoleId, RoleManager, RoleStore, YamlRoleStore,
};
use async_trait::async_trait;
use chrono::Duration;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

const TTL_MINUTES: i64 = 30;

fn write_roles(path: &std::path::Path, roles: Vec<Role>) {
    RoleFile { roles }.save(path).unwrap();
}

/// Test: Role file edits become visible after invalidation or TTL expiry, not before
#[tokio::test]
async fn test_yaml_store_staleness_bounded_by_invalidation_and_ttl() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("roles.yaml");

    let adjuster = Role::new(RoleId::new(), "Adjuster").with_permission("Claims", PermissionLevel::Write);
    let id = adjuster.id;
    write_roles(&path, vec![adjuster.clone()]);

    let clock = Arc::new(ManualClock::default());
    let cache = PermissionCache::new(
        Arc::new(YamlRoleStore::new(&path)),
        clock.clone(),
        Duration::minutes(TTL_MINUTES),
    );

    assert!(cache.has_permission(&id, "Claims", PermissionLevel::Write).await.unwrap());

    // Downgrade on disk: cache still serves the old snapshot
    write_roles(&path, vec![Role::new(id, "Adjuster").with_permission("Claims", PermissionLevel::Read)]);
    assert!(cache.has_permission(&id, "Claims", PermissionLevel::Write).await.unwrap());

    // Explicit invalidation picks up the change
    cache.invalidate_role(&id);
    assert!(!cache.has_permission(&id, "Claims", PermissionLevel::Write).await.unwrap());
    assert!(cache.has_permission(&id, "Claims", PermissionLevel::Read).await.unwrap());

    // Revoke on disk: visible once the TTL has passed
    write_roles(&path, vec![Role::new(id, "Adjuster")]);
    clock.advance(Duration::minutes(TTL_MINUTES) - Duration::seconds(1));
    assert!(cache.has_permission(&id, "Claims", PermissionLevel::Read).await.unwrap());

    clock.advance(Duration::seconds(2));
    assert!(!cache.has_permission(&id, "Claims", PermissionLevel::Read).await.unwrap());
}

/// Test: A missing or corrupt role file denies and caches nothing
#[tokio::test]
async fn test_yaml_store_fails_closed() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("roles.yaml");
    let id = RoleId::new();

    let cache = PermissionCache::new(
        Arc::new(YamlRoleStore::new(&path)),
        Arc::new(ManualClock::default()),
        Duration::minutes(TTL_MINUTES),
    );

    let err = cache.has_permission(&id, "Claims", PermissionLevel::Read).await.unwrap_err();
    assert!(matches!(err, CoreError::StoreUnavailable(_)));
    assert!(err.is_fail_closed());
    assert!(cache.is_empty());

    std::fs::write(&path, "roles: [this is: not valid").unwrap();
    let err = cache.has_permission(&id, "Claims", PermissionLevel::Read).await.unwrap_err();
    assert!(matches!(err, CoreError::StoreUnavailable(_)));
    assert!(cache.is_empty());

    // Recovery: the next call loads normally
    write_roles(&path, vec![Role::new(id, "Viewer").with_permission("Claims", PermissionLevel::Read)]);
    assert!(cache.has_permission(&id, "Claims", PermissionLevel::Read).await.unwrap());
    assert_eq!(cache.len(), 1);

    let stats = cache.stats();
    assert_eq!(stats.load_failures, 2);
    assert_eq!(stats.loads, 3);
}

/// Test: Hand-written role files with lowercase levels load
#[tokio::test]
async fn test_yaml_store_accepts_hand_written_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("roles.yaml");
    let id = RoleId::new();

    std::fs::write(
        &path,
        format!(
            "roles:\n  - id: {}\n    name: Supervisor\n    permissions:\n      Claims: write\n      Rules: Read\n",
            id
        ),
    )
    .unwrap();

    let cache = PermissionCache::new(
        Arc::new(YamlRoleStore::new(&path)),
        Arc::new(ManualClock::default()),
        Duration::minutes(TTL_MINUTES),
    );

    let permissions = cache.permissions_for(&id).await.unwrap();
    assert_eq!(permissions.get("Claims"), Some(&PermissionLevel::Write));
    assert_eq!(permissions.get("Rules"), Some(&PermissionLevel::Read));
}

/// Test: Role manager mutations are visible on the very next check
#[tokio::test]
async fn test_role_manager_changes_visible_immediately() {
    let role = Role::new(RoleId::new(), "Analyst").with_permission("Reports", PermissionLevel::Read);
    let id = role.id;

    let store = Arc::new(InMemoryRoleStore::with_roles([role]));
    let cache = Arc::new(PermissionCache::new(
        store.clone(),
        Arc::new(ManualClock::default()),
        Duration::minutes(TTL_MINUTES),
    ));
    let manager = RoleManager::new(store.clone(), cache.clone());

    assert!(!cache.has_permission(&id, "Reports", PermissionLevel::Write).await.unwrap());

    manager.set_feature_level(&id, "Reports", PermissionLevel::Write).await.unwrap();
    assert!(cache.has_permission(&id, "Reports", PermissionLevel::Write).await.unwrap());

    assert_eq!(
        manager.revoke_feature(&id, "Reports").await.unwrap(),
        Some(PermissionLevel::Write)
    );
    assert!(!cache.has_permission(&id, "Reports", PermissionLevel::Read).await.unwrap());

    manager.set_feature_level(&id, "Claims", PermissionLevel::Read).await.unwrap();
    assert!(cache.has_permission(&id, "Claims", PermissionLevel::Read).await.unwrap());

    assert!(manager.delete_role(&id).await.unwrap());
    assert!(!cache.has_permission(&id, "Claims", PermissionLevel::Read).await.unwrap());
}

/// Test: Checks and invalidations racing across threads never error or panic
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_and_invalidations() {
    let roles: Vec<Role> = (0..8)
        .map(|i| Role::new(RoleId::new(), format!("role-{}", i)).with_permission("Claims", PermissionLevel::Write))
        .collect();
    let ids: Vec<RoleId> = roles.iter().map(|r| r.id).collect();

    let cache = Arc::new(PermissionCache::new(
        Arc::new(InMemoryRoleStore::with_roles(roles)),
        Arc::new(ManualClock::default()),
        Duration::minutes(TTL_MINUTES),
    ));

    let mut tasks = Vec::new();
    for worker in 0..16 {
        let cache = cache.clone();
        let ids = ids.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..200 {
                let id = ids[(worker + round) % ids.len()];
                if round % 7 == 0 {
                    cache.invalidate_role(&id);
                }
                if round % 50 == 0 {
                    cache.invalidate_all();
                }
                assert!(cache.has_permission(&id, "Claims", PermissionLevel::Read).await.unwrap());
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    assert!(cache.len() <= ids.len());
    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, 16 * 200);
}

/// Store that snapshots permissions when called, then waits for a release signal
struct GatedStore {
    permissions: Mutex<FeaturePermissions>,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl RoleStore for GatedStore {
    async fn get_permissions(&self, _role_id: &RoleId) -> adjudication_core::Result<FeaturePermissions> {
        let snapshot = self.permissions.lock().unwrap().clone();
        self.entered.notify_one();
        self.release.notified().await;
        Ok(snapshot)
    }
}

/// Test: An invalidation that lands during an in-flight load does not stop the
/// stale result from being cached.
///
/// Known limitation: staleness is bounded by the next invalidation or the TTL.
#[tokio::test]
async fn test_invalidation_during_load_may_cache_stale_snapshot() {
    let id = RoleId::new();
    let mut initial = FeaturePermissions::new();
    initial.insert("Claims".to_string(), PermissionLevel::Write);

    let store = Arc::new(GatedStore {
        permissions: Mutex::new(initial),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let clock = Arc::new(ManualClock::default());
    let cache = Arc::new(PermissionCache::new(store.clone(), clock.clone(), Duration::minutes(TTL_MINUTES)));

    let in_flight = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.has_permission(&id, "Claims", PermissionLevel::Write).await })
    };

    store.entered.notified().await;

    // Downgrade and invalidate while the load is parked
    store
        .permissions
        .lock()
        .unwrap()
        .insert("Claims".to_string(), PermissionLevel::Read);
    cache.invalidate_role(&id);

    store.release.notify_one();
    assert!(in_flight.await.unwrap().unwrap());

    let entry = cache.cached_entry(&id).unwrap();
    assert_eq!(entry.permissions.get("Claims"), Some(&PermissionLevel::Write));

    // The next invalidation converges
    cache.invalidate_role(&id);
    let recheck = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.has_permission(&id, "Claims", PermissionLevel::Write).await })
    };
    store.entered.notified().await;
    store.release.notify_one();
    assert!(!recheck.await.unwrap().unwrap());
}
