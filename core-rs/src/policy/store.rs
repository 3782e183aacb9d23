//! Policy record store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{PolicyId, PolicyRecord, PolicyStatus};
use crate::errors::{CoreError, Result};

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn insert(&self, record: PolicyRecord) -> Result<()>;

    async fn get(&self, id: &PolicyId) -> Result<Option<PolicyRecord>>;

    /// Set status and failure reason, stamping `updated_at`.
    ///
    /// # Errors
    /// [`CoreError::PolicyNotFound`] if no record exists.
    async fn set_status(
        &self,
        id: &PolicyId,
        status: PolicyStatus,
        failure_reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<PolicyRecord>;

    async fn list(&self) -> Result<Vec<PolicyRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    records: RwLock<HashMap<PolicyId, PolicyRecord>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        InMemoryPolicyStore::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn insert(&self, record: PolicyRecord) -> Result<()> {
        self.records.write().await.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: &PolicyId) -> Result<Option<PolicyRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn set_status(
        &self,
        id: &PolicyId,
        status: PolicyStatus,
        failure_reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<PolicyRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or(CoreError::PolicyNotFound(*id))?;

        record.status = status;
        record.failure_reason = failure_reason;
        record.updated_at = at;

        Ok(record.clone())
    }

    async fn list(&self) -> Result<Vec<PolicyRecord>> {
        let mut records: Vec<PolicyRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.uploaded_at);
        Ok(records)
    }
}
