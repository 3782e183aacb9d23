//! Policy documents: records, their status store, upload and status tracking
//!
//! Upload persists a `Pending` record and enqueues ingestion. The status
//! handler moves the record to `Processing`, then `Active` or `Failed`.
//! Ingestion failures are only discoverable by reading the record back.

pub mod status_handler;
pub mod store;
pub mod upload;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::CoreError;

pub use status_handler::{DocumentProcessor, StatusTrackingHandler};
pub use store::{InMemoryPolicyStore, PolicyStore};
pub use upload::UploadService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(Uuid);

impl PolicyId {
    pub fn new() -> Self {
        PolicyId(Uuid::new_v4())
    }
}

impl Default for PolicyId {
    fn default() -> Self {
        PolicyId::new()
    }
}

impl From<Uuid> for PolicyId {
    fn from(id: Uuid) -> Self {
        PolicyId(id)
    }
}

impl FromStr for PolicyId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(PolicyId)
            .map_err(|e| CoreError::Config(format!("Invalid policy id '{}': {}", s, e)))
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyStatus {
    Pending,
    Processing,
    Active,
    Failed,
}

impl PolicyStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PolicyStatus::Active | PolicyStatus::Failed)
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PolicyStatus::Pending => "Pending",
            PolicyStatus::Processing => "Processing",
            PolicyStatus::Active => "Active",
            PolicyStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    pub id: PolicyId,
    pub name: String,
    pub file_name: String,
    pub status: PolicyStatus,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl PolicyRecord {
    /// Fresh record awaiting ingestion
    pub fn pending(id: PolicyId, name: impl Into<String>, file_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        PolicyRecord {
            id,
            name: name.into(),
            file_name: file_name.into(),
            status: PolicyStatus::Pending,
            uploaded_at: now,
            updated_at: now,
            failure_reason: None,
        }
    }
}
