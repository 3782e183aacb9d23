/**
 * config.rs
 * Parser for core configuration files (YAML format)
 *
 * Format:
 * ```yaml
 * apiVersion: adjudication/v1
 * kind: CoreConfig
 * spec:
 *   permissionCache:
 *     ttlSeconds: 1800
 *   ingest:
 *     depthWarning: 1000
 *     stopGraceSeconds: 30
 * ```
 *
 * Every section under `spec` is optional and falls back to defaults.
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::errors::{CoreError, Result};

pub const API_VERSION: &str = "adjudication/v1";
pub const KIND: &str = "CoreConfig";

/// Default permission cache TTL (30 minutes)
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 30 * 60;

/// Upper bound on the permission cache TTL (7 days)
pub const MAX_CACHE_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Default pending depth at which the ingest queue starts warning
pub const DEFAULT_DEPTH_WARNING: usize = 1_000;

pub const DEFAULT_STOP_GRACE_SECONDS: u64 = 30;

/// Core configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub spec: CoreSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoreSpec {
    #[serde(default)]
    pub permission_cache: PermissionCacheConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionCacheConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for PermissionCacheConfig {
    fn default() -> Self {
        PermissionCacheConfig {
            ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
        }
    }
}

impl PermissionCacheConfig {
    /// TTL as a chrono duration, clamped to [`MAX_CACHE_TTL_SECONDS`]
    pub fn ttl(&self) -> chrono::Duration {
        let max = chrono::Duration::seconds(MAX_CACHE_TTL_SECONDS as i64);

        i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .map(|ttl| ttl.min(max))
            .unwrap_or(max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestConfig {
    /// Pending depth that triggers a warning log. `null` disables the warning.
    #[serde(default = "default_depth_warning")]
    pub depth_warning: Option<usize>,
    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            depth_warning: default_depth_warning(),
            stop_grace_seconds: DEFAULT_STOP_GRACE_SECONDS,
        }
    }
}

impl IngestConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}

fn default_depth_warning() -> Option<usize> {
    Some(DEFAULT_DEPTH_WARNING)
}

fn default_stop_grace_seconds() -> u64 {
    DEFAULT_STOP_GRACE_SECONDS
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            spec: CoreSpec::default(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from specified path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: CoreConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structure
    ///
    /// Ensures:
    /// - apiVersion is "adjudication/v1"
    /// - kind is "CoreConfig"
    /// - cache TTL is non-zero and at most [`MAX_CACHE_TTL_SECONDS`]
    pub fn validate(&self) -> Result<()> {
        if self.api_version != API_VERSION {
            return Err(CoreError::Config(format!(
                "Invalid apiVersion: expected '{}', got '{}'",
                API_VERSION, self.api_version
            )));
        }

        if self.kind != KIND {
            return Err(CoreError::Config(format!(
                "Invalid kind: expected '{}', got '{}'",
                KIND, self.kind
            )));
        }

        if self.spec.permission_cache.ttl_seconds == 0 {
            return Err(CoreError::Config(
                "spec.permissionCache.ttlSeconds must be greater than zero".to_string(),
            ));
        }

        if self.spec.permission_cache.ttl_seconds > MAX_CACHE_TTL_SECONDS {
            return Err(CoreError::Config(format!(
                "spec.permissionCache.ttlSeconds must be at most {} (got {})",
                MAX_CACHE_TTL_SECONDS, self.spec.permission_cache.ttl_seconds
            )));
        }

        if self.spec.ingest.depth_warning == Some(0) {
            return Err(CoreError::Config(
                "spec.ingest.depthWarning must be greater than zero (use null to disable)".to_string(),
            ));
        }

        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path.as_ref(), yaml)?;
        Ok(())
    }
}
