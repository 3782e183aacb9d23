//! Ingestion handler seam
//!
//! The worker asks a [`HandlerScope`] for a fresh handler for every event, so
//! no per-event state leaks from one invocation into the next.

use async_trait::async_trait;
use std::sync::Arc;

use super::event::PolicyIngestEvent;

/// External processing step for one ingestion event.
///
/// Called repeatedly by a single worker, one event at a time. Retries and
/// durability, if needed, belong here: the worker drops failed events.
#[async_trait]
pub trait IngestHandler: Send + Sync {
    async fn handle(&self, event: PolicyIngestEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl<H: IngestHandler + ?Sized> IngestHandler for Arc<H> {
    async fn handle(&self, event: PolicyIngestEvent) -> anyhow::Result<()> {
        (**self).handle(event).await
    }
}

/// Creates the isolated handler instance used for a single event
pub trait HandlerScope: Send + Sync {
    fn begin(&self) -> Box<dyn IngestHandler>;
}

impl<F, H> HandlerScope for F
where
    F: Fn() -> H + Send + Sync,
    H: IngestHandler + 'static,
{
    fn begin(&self) -> Box<dyn IngestHandler> {
        Box::new(self())
    }
}

/// Scope that hands out the same stateless handler for every event
pub struct SharedScope<H> {
    handler: Arc<H>,
}

impl<H: IngestHandler + 'static> SharedScope<H> {
    pub fn new(handler: H) -> Self {
        SharedScope {
            handler: Arc::new(handler),
        }
    }

    pub fn from_arc(handler: Arc<H>) -> Self {
        SharedScope { handler }
    }
}

impl<H: IngestHandler + 'static> HandlerScope for SharedScope<H> {
    fn begin(&self) -> Box<dyn IngestHandler> {
        Box::new(Arc::clone(&self.handler))
    }
}
