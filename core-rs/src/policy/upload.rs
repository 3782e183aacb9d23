//! Document upload: persist the record, then hand the bytes to ingestion.
//!
//! Upload returns as soon as the event is queued. Whatever happens during
//! ingestion is reported through the record's status, never to the uploader.

use std::sync::Arc;
use tracing::{error, info};

use super::store::PolicyStore;
use super::{PolicyId, PolicyRecord, PolicyStatus};
use crate::clock::Clock;
use crate::errors::Result;
use crate::ingest::{IngestQueue, PolicyIngestEvent};

pub struct UploadService {
    store: Arc<dyn PolicyStore>,
    queue: IngestQueue,
    clock: Arc<dyn Clock>,
}

impl UploadService {
    pub fn new(store: Arc<dyn PolicyStore>, queue: IngestQueue, clock: Arc<dyn Clock>) -> Self {
        UploadService { store, queue, clock }
    }

    /// Persist a `Pending` policy record and enqueue it for ingestion.
    ///
    /// # Errors
    /// Store failures, or [`crate::CoreError::QueueClosed`] if the pipeline is gone.
    /// In the latter case the record is marked `Failed` before returning.
    pub async fn upload(
        &self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content: Vec<u8>,
    ) -> Result<PolicyRecord> {
        let now = self.clock.now();
        let record = PolicyRecord::pending(PolicyId::new(), name, file_name, now);

        self.store.insert(record.clone()).await?;

        let event = PolicyIngestEvent::new(record.id, record.name.clone(), record.file_name.clone(), content, now);
        let size = event.size();

        if let Err(e) = self.queue.enqueue(event) {
            error!(policy_id = %record.id, policy_name = %record.name, error = %e, "[Upload] Could not enqueue ingestion");
            if let Err(status_err) = self
                .store
                .set_status(&record.id, PolicyStatus::Failed, Some(e.to_string()), self.clock.now())
                .await
            {
                error!(
                    policy_id = %record.id,
                    error = %status_err,
                    "[Upload] Could not mark policy as failed"
                );
            }
            return Err(e);
        }

        info!(
            policy_id = %record.id,
            policy_name = %record.name,
            file_name = %record.file_name,
            size,
            "[Upload] Policy stored, ingestion queued"
        );

        Ok(record)
    }
}
