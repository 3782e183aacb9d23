//! Unbounded multi-producer / single-consumer ingestion queue
//!
//! [`IngestQueue`] is the cloneable producer half; [`IngestConsumer`] is the one
//! and only consumer. Enqueue never blocks. There is no backpressure: depth is
//! only observed, and optionally warned about.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::event::PolicyIngestEvent;
use crate::errors::{CoreError, Result};

#[derive(Debug)]
struct QueueDepth {
    pending: AtomicUsize,
    enqueued: AtomicU64,
    warn_at: Option<usize>,
}

/// Create a queue without a depth warning
pub fn ingest_queue() -> (IngestQueue, IngestConsumer) {
    ingest_queue_with_warning(None)
}

/// Create a queue that logs a warning each time pending depth climbs to `warn_at`
pub fn ingest_queue_with_warning(warn_at: Option<usize>) -> (IngestQueue, IngestConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(QueueDepth {
        pending: AtomicUsize::new(0),
        enqueued: AtomicU64::new(0),
        warn_at,
    });

    (
        IngestQueue {
            tx,
            depth: Arc::clone(&depth),
        },
        IngestConsumer { rx, depth },
    )
}

/// Producer half
#[derive(Debug, Clone)]
pub struct IngestQueue {
    tx: mpsc::UnboundedSender<PolicyIngestEvent>,
    depth: Arc<QueueDepth>,
}

impl IngestQueue {
    /// Append `event` to the tail.
    ///
    /// # Errors
    /// [`CoreError::QueueClosed`] if the consumer has been dropped or closed.
    pub fn enqueue(&self, event: PolicyIngestEvent) -> Result<()> {
        let policy_id = event.policy_id();

        // Count before sending so the consumer can never decrement below zero.
        let pending = self.depth.pending.fetch_add(1, Ordering::SeqCst) + 1;

        if self.tx.send(event).is_err() {
            self.depth.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(CoreError::QueueClosed);
        }

        self.depth.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(policy_id = %policy_id, pending, "[IngestQueue] Event enqueued");

        if self.depth.warn_at == Some(pending) {
            warn!(pending, "[IngestQueue] Pending ingestion events reached warning threshold");
        }

        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.depth.pending.load(Ordering::SeqCst)
    }

    /// Total events accepted since creation
    pub fn enqueued(&self) -> u64 {
        self.depth.enqueued.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half. Not `Clone`: exactly one logical consumer exists per queue.
#[derive(Debug)]
pub struct IngestConsumer {
    rx: mpsc::UnboundedReceiver<PolicyIngestEvent>,
    depth: Arc<QueueDepth>,
}

impl IngestConsumer {
    /// Next event in FIFO order, suspending while the queue is empty.
    ///
    /// Returns `None` once every producer is dropped and the queue is drained.
    /// Cancel safe: dropping the future before it resolves loses no event.
    pub async fn dequeue(&mut self) -> Option<PolicyIngestEvent> {
        let event = self.rx.recv().await?;
        self.depth.pending.fetch_sub(1, Ordering::SeqCst);
        Some(event)
    }

    /// Next event if one is ready, without suspending
    pub fn try_dequeue(&mut self) -> Option<PolicyIngestEvent> {
        let event = self.rx.try_recv().ok()?;
        self.depth.pending.fetch_sub(1, Ordering::SeqCst);
        Some(event)
    }

    /// Refuse further enqueues; already queued events stay available
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn pending(&self) -> usize {
        self.depth.pending.load(Ordering::SeqCst)
    }
}
