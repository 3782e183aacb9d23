//! Permission levels, roles and feature mappings

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::CoreError;

/// Capability tier assigned per feature to a role.
///
/// The order is an explicit rank: `Read < Write`. The only authorization rule is
/// [`PermissionLevel::satisfies`]: Write satisfies Read requirements, Read never
/// satisfies Write. No third level exists at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionLevel {
    /// View access
    #[serde(alias = "read")]
    Read,
    /// Modify access, implies Read
    #[serde(alias = "write")]
    Write,
}

impl PermissionLevel {
    pub const ALL: [PermissionLevel; 2] = [PermissionLevel::Read, PermissionLevel::Write];

    fn rank(self) -> u8 {
        match self {
            PermissionLevel::Read => 1,
            PermissionLevel::Write => 2,
        }
    }

    /// True if a grant at `self` authorizes an action requiring `required`.
    pub fn satisfies(self, required: PermissionLevel) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionLevel::Read => "Read",
            PermissionLevel::Write => "Write",
        }
    }
}

impl PartialOrd for PermissionLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PermissionLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(PermissionLevel::Read),
            "write" => Ok(PermissionLevel::Write),
            other => Err(CoreError::Config(format!(
                "Unknown permission level '{}': expected Read or Write",
                other
            ))),
        }
    }
}

/// Feature name -> granted level
pub type FeaturePermissions = HashMap<String, PermissionLevel>;

/// Opaque role identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(Uuid);

impl RoleId {
    pub fn new() -> Self {
        RoleId(Uuid::new_v4())
    }
}

impl Default for RoleId {
    fn default() -> Self {
        RoleId::new()
    }
}

impl From<Uuid> for RoleId {
    fn from(id: Uuid) -> Self {
        RoleId(id)
    }
}

impl FromStr for RoleId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(RoleId)
            .map_err(|e| CoreError::Config(format!("Invalid role id '{}': {}", s, e)))
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Named bundle of feature -> level assignments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub permissions: FeaturePermissions,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        Role {
            id,
            name: name.into(),
            permissions: FeaturePermissions::new(),
        }
    }

    /// Builder-style grant, mainly for fixtures
    pub fn with_permission(mut self, feature: impl Into<String>, level: PermissionLevel) -> Self {
        self.permissions.insert(feature.into(), level);
        self
    }
}

/// Authorization rule over a resolved mapping.
///
/// Absent feature resolves to `false`, never an error.
pub fn is_granted(permissions: &FeaturePermissions, feature: &str, required: PermissionLevel) -> bool {
    permissions
        .get(feature)
        .map(|assigned| assigned.satisfies(required))
        .unwrap_or(false)
}
