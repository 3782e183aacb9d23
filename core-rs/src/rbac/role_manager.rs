//! Role management: writes role changes and keeps the permission cache honest.
//!
//! Every mutation invalidates the role's cache entry before returning success, so
//! the next authorization for that role is at most one store round trip from the
//! new state.

use std::sync::Arc;
use tracing::info;

use super::permission::{PermissionLevel, Role, RoleId};
use super::permission_cache::PermissionCache;
use super::store::RoleWriter;
use crate::errors::{CoreError, Result};

pub struct RoleManager {
    writer: Arc<dyn RoleWriter>,
    cache: Arc<PermissionCache>,
}

impl RoleManager {
    pub fn new(writer: Arc<dyn RoleWriter>, cache: Arc<PermissionCache>) -> Self {
        RoleManager { writer, cache }
    }

    /// Create or replace a role wholesale
    pub async fn save_role(&self, role: Role) -> Result<()> {
        let id = role.id;
        let name = role.name.clone();

        self.writer.save_role(role).await?;
        self.cache.invalidate_role(&id);

        info!(role_id = %id, role_name = %name, "[RoleManager] Role saved");
        Ok(())
    }

    /// Grant (or change) a single feature level
    pub async fn set_feature_level(&self, role_id: &RoleId, feature: &str, level: PermissionLevel) -> Result<Role> {
        if feature.is_empty() {
            return Err(CoreError::Config("Feature name cannot be empty".to_string()));
        }

        let mut role = self.require_role(role_id).await?;
        role.permissions.insert(feature.to_string(), level);

        self.writer.save_role(role.clone()).await?;
        self.cache.invalidate_role(role_id);

        info!(role_id = %role_id, feature, level = %level, "[RoleManager] Feature level set");
        Ok(role)
    }

    /// Remove a feature grant. Returns the previous level, if any.
    pub async fn revoke_feature(&self, role_id: &RoleId, feature: &str) -> Result<Option<PermissionLevel>> {
        let mut role = self.require_role(role_id).await?;
        let previous = role.permissions.remove(feature);

        if previous.is_some() {
            self.writer.save_role(role).await?;
            info!(role_id = %role_id, feature, "[RoleManager] Feature revoked");
        }

        self.cache.invalidate_role(role_id);
        Ok(previous)
    }

    pub async fn delete_role(&self, role_id: &RoleId) -> Result<bool> {
        let removed = self.writer.delete_role(role_id).await?;
        self.cache.invalidate_role(role_id);

        if removed {
            info!(role_id = %role_id, "[RoleManager] Role deleted");
        }
        Ok(removed)
    }

    async fn require_role(&self, role_id: &RoleId) -> Result<Role> {
        self.writer
            .get_role(role_id)
            .await?
            .ok_or_else(|| CoreError::Config(format!("Role not found: {}", role_id)))
    }
}
