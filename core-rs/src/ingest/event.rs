//! Policy ingestion event

use chrono::{DateTime, Utc};
use std::fmt;

use crate::policy::PolicyId;

/// One uploaded policy document awaiting processing.
///
/// Immutable once built. Moved into the queue on enqueue and into the handler
/// on dispatch; it is never cloned along the way.
#[derive(Debug, PartialEq, Eq)]
pub struct PolicyIngestEvent {
    policy_id: PolicyId,
    policy_name: String,
    file_name: String,
    content: Vec<u8>,
    ingested_at: DateTime<Utc>,
}

impl PolicyIngestEvent {
    pub fn new(
        policy_id: PolicyId,
        policy_name: impl Into<String>,
        file_name: impl Into<String>,
        content: Vec<u8>,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        PolicyIngestEvent {
            policy_id,
            policy_name: policy_name.into(),
            file_name: file_name.into(),
            content,
            ingested_at,
        }
    }

    pub fn policy_id(&self) -> PolicyId {
        self.policy_id
    }

    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn ingested_at(&self) -> DateTime<Utc> {
        self.ingested_at
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

impl fmt::Display for PolicyIngestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.policy_name, self.policy_id, self.file_name)
    }
}
