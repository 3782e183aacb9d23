//! Ingestion pipeline module
//!
//! Upload hands a [`PolicyIngestEvent`] to the [`IngestQueue`]; one
//! [`IngestWorker`] drains it in order and calls the external handler.

pub mod event;
pub mod handler;
pub mod queue;
pub mod shutdown;
pub mod worker;

pub use event::PolicyIngestEvent;
pub use handler::{HandlerScope, IngestHandler, SharedScope};
pub use queue::{ingest_queue, ingest_queue_with_warning, IngestConsumer, IngestQueue};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use worker::{IngestWorker, WorkerState, WorkerStats};
