//! RBAC (Role-Based Access Control) module
//!
//! Provides the permission level model, role store collaborators, the
//! TTL permission cache and the role manager that invalidates it.

pub mod permission;
pub mod permission_cache;
pub mod role_manager;
pub mod store;

pub use permission::{is_granted, FeaturePermissions, PermissionLevel, Role, RoleId};
pub use permission_cache::{CacheStats, PermissionCache, PermissionCacheEntry};
pub use role_manager::RoleManager;
pub use store::{InMemoryRoleStore, RoleFile, RoleStore, RoleWriter, YamlRoleStore};
