//! Ingestion handler that tracks policy status around document processing

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::store::PolicyStore;
use super::PolicyStatus;
use crate::clock::Clock;
use crate::ingest::{IngestHandler, PolicyIngestEvent};

/// The document-understanding step (parsing, indexing). Only the seam lives here.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    async fn process(&self, event: &PolicyIngestEvent) -> anyhow::Result<()>;
}

/// `Processing` -> processor -> `Active`, or `Failed` with the error chain as reason.
///
/// Processor errors are returned after the record is marked, so the worker logs them.
#[derive(Clone)]
pub struct StatusTrackingHandler {
    store: Arc<dyn PolicyStore>,
    processor: Arc<dyn DocumentProcessor>,
    clock: Arc<dyn Clock>,
}

impl StatusTrackingHandler {
    pub fn new(store: Arc<dyn PolicyStore>, processor: Arc<dyn DocumentProcessor>, clock: Arc<dyn Clock>) -> Self {
        StatusTrackingHandler { store, processor, clock }
    }
}

#[async_trait]
impl IngestHandler for StatusTrackingHandler {
    async fn handle(&self, event: PolicyIngestEvent) -> anyhow::Result<()> {
        let id = event.policy_id();

        self.store
            .set_status(&id, PolicyStatus::Processing, None, self.clock.now())
            .await
            .with_context(|| format!("marking policy {} as processing", id))?;

        match self.processor.process(&event).await {
            Ok(()) => {
                self.store
                    .set_status(&id, PolicyStatus::Active, None, self.clock.now())
                    .await
                    .with_context(|| format!("marking policy {} as active", id))?;

                info!(policy_id = %id, policy_name = %event.policy_name(), "[Ingest] Policy active");
                Ok(())
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                self.store
                    .set_status(&id, PolicyStatus::Failed, Some(reason), self.clock.now())
                    .await
                    .with_context(|| format!("marking policy {} as failed", id))?;

                Err(e.context(format!("processing {} failed", event.file_name())))
            }
        }
    }
}
