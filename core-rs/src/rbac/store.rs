//! Role store collaborators
//!
//! [`RoleStore`] is the authoritative source the permission cache loads from.
//! [`RoleWriter`] is the write side used by [`super::RoleManager`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::permission::{FeaturePermissions, Role, RoleId};
use crate::errors::{CoreError, Result};

/// Authoritative role -> permissions lookup.
///
/// An unknown role resolves to an empty mapping. Errors mean the store could not
/// answer and must surface as [`CoreError::StoreUnavailable`].
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_permissions(&self, role_id: &RoleId) -> Result<FeaturePermissions>;
}

/// Write side of a role store
#[async_trait]
pub trait RoleWriter: Send + Sync {
    async fn get_role(&self, role_id: &RoleId) -> Result<Option<Role>>;

    async fn save_role(&self, role: Role) -> Result<()>;

    /// Returns true if a role was removed
    async fn delete_role(&self, role_id: &RoleId) -> Result<bool>;
}

/// In-process role store
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    roles: RwLock<HashMap<RoleId, Role>>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        InMemoryRoleStore::default()
    }

    pub fn with_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        InMemoryRoleStore {
            roles: RwLock::new(roles.into_iter().map(|r| (r.id, r)).collect()),
        }
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get_permissions(&self, role_id: &RoleId) -> Result<FeaturePermissions> {
        Ok(self
            .roles
            .read()
            .await
            .get(role_id)
            .map(|r| r.permissions.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RoleWriter for InMemoryRoleStore {
    async fn get_role(&self, role_id: &RoleId) -> Result<Option<Role>> {
        Ok(self.roles.read().await.get(role_id).cloned())
    }

    async fn save_role(&self, role: Role) -> Result<()> {
        self.roles.write().await.insert(role.id, role);
        Ok(())
    }

    async fn delete_role(&self, role_id: &RoleId) -> Result<bool> {
        Ok(self.roles.write().await.remove(role_id).is_some())
    }
}

/// Role file structure
///
/// ```yaml
/// roles:
///   - id: 6f1c2a4e-8d7b-4c1a-9e0f-3b2d1c0a9f8e
///     name: Adjudicator
///     permissions:
///       Claims: Write
///       Rules: Read
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoleFile {
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl RoleFile {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), yaml)?;
        Ok(())
    }
}

/// Role store backed by a YAML file, re-read on every load.
///
/// The file is the authority; the permission cache in front of it bounds how
/// often it is read. A missing or malformed file fails closed.
#[derive(Debug, Clone)]
pub struct YamlRoleStore {
    path: PathBuf,
}

impl YamlRoleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        YamlRoleStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load_file(&self) -> Result<RoleFile> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CoreError::StoreUnavailable(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        RoleFile::parse(&content).map_err(|e| {
            CoreError::StoreUnavailable(format!("Invalid role file {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl RoleStore for YamlRoleStore {
    async fn get_permissions(&self, role_id: &RoleId) -> Result<FeaturePermissions> {
        let file = self.load_file().await?;

        Ok(file
            .roles
            .into_iter()
            .find(|r| &r.id == role_id)
            .map(|r| r.permissions)
            .unwrap_or_default())
    }
}
