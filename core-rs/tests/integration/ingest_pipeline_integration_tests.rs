//! Integration tests for the policy ingestion pipeline
//!
//! Upload -> queue -> worker -> status tracking handler -> policy store, with
//! failing and panicking documents mixed into the stream.

use adjudication_core::{
    ingest_queue, shutdown_channel, CoreError, DocumentProcessor, InMemoryPolicyStore, IngestWorker, ManualClock,
    PolicyIngestEvent, PolicyStatus, PolicyStore, ShutdownSignal, StatusTrackingHandler, UploadService, WorkerState,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Accepts documents unless their file name says otherwise
#[derive(Default)]
struct ScriptedProcessor {
    processed: AtomicUsize,
}

#[async_trait]
impl DocumentProcessor for ScriptedProcessor {
    async fn process(&self, event: &PolicyIngestEvent) -> anyhow::Result<()> {
        self.processed.fetch_add(1, Ordering::SeqCst);

        if event.file_name().starts_with("corrupt") {
            anyhow::bail!("unreadable document");
        }
        if event.file_name().starts_with("explode") {
            panic!("parser crashed on {}", event.file_name());
        }
        Ok(())
    }
}

struct Pipeline {
    store: Arc<InMemoryPolicyStore>,
    processor: Arc<ScriptedProcessor>,
    upload: UploadService,
    worker: IngestWorker,
}

fn pipeline() -> (Pipeline, adjudication_core::IngestConsumer) {
    let store = Arc::new(InMemoryPolicyStore::new());
    let clock = Arc::new(ManualClock::default());
    let processor = Arc::new(ScriptedProcessor::default());
    let (queue, consumer) = ingest_queue();

    let handler = StatusTrackingHandler::new(store.clone(), processor.clone(), clock.clone());
    let worker = IngestWorker::new(Arc::new(move || handler.clone()));
    let upload = UploadService::new(store.clone(), queue, clock);

    (
        Pipeline {
            store,
            processor,
            upload,
            worker,
        },
        consumer,
    )
}

async fn status_of(store: &InMemoryPolicyStore, name: &str) -> PolicyStatus {
    store
        .list()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.name == name)
        .map(|r| r.status)
        .unwrap()
}

/// Test: Every uploaded document reaches a final status, failures included
#[tokio::test]
async fn test_uploads_reach_terminal_status() {
    let (mut p, consumer) = pipeline();
    p.worker.start(consumer, ShutdownSignal::never()).unwrap();

    let good = p.upload.upload("Property", "property.pdf", b"%PDF-1.7".to_vec()).await.unwrap();
    let bad = p.upload.upload("Broken", "corrupt.pdf", b"%PDF".to_vec()).await.unwrap();
    let last = p.upload.upload("Auto", "auto.pdf", b"%PDF".to_vec()).await.unwrap();

    // Upload returns before processing; records start Pending
    assert_eq!(good.status, PolicyStatus::Pending);

    drop(p.upload);
    p.worker.join().await.unwrap();

    let good = p.store.get(&good.id).await.unwrap().unwrap();
    assert_eq!(good.status, PolicyStatus::Active);

    let bad = p.store.get(&bad.id).await.unwrap().unwrap();
    assert_eq!(bad.status, PolicyStatus::Failed);
    assert_eq!(bad.failure_reason.as_deref(), Some("unreadable document"));

    let last = p.store.get(&last.id).await.unwrap().unwrap();
    assert_eq!(last.status, PolicyStatus::Active);

    assert_eq!(p.worker.stats().failed, 1);
    assert_eq!(p.worker.state(), WorkerState::Stopped);
}

/// Test: A panicking processor does not stall the queue
///
/// The panicking document is left in `Processing`; nothing downstream retries it.
#[tokio::test]
async fn test_panicking_document_does_not_stall_queue() {
    let (mut p, consumer) = pipeline();
    p.worker.start(consumer, ShutdownSignal::never()).unwrap();

    p.upload.upload("Before", "before.pdf", b"%PDF".to_vec()).await.unwrap();
    p.upload.upload("Boom", "explode.pdf", b"%PDF".to_vec()).await.unwrap();
    p.upload.upload("After", "after.pdf", b"%PDF".to_vec()).await.unwrap();

    drop(p.upload);
    p.worker.join().await.unwrap();

    assert_eq!(status_of(&p.store, "Before").await, PolicyStatus::Active);
    assert_eq!(status_of(&p.store, "Boom").await, PolicyStatus::Processing);
    assert_eq!(status_of(&p.store, "After").await, PolicyStatus::Active);
    assert_eq!(p.processor.processed.load(Ordering::SeqCst), 3);

    let stats = p.worker.stats();
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 1);
}

/// Test: Host shutdown leaves queued uploads Pending; a restart picks them up
#[tokio::test]
async fn test_host_shutdown_then_restart_resumes() {
    let (mut p, consumer) = pipeline();

    // Uploads queue up while the worker is not running
    for name in ["One", "Two", "Three"] {
        p.upload.upload(name, format!("{}.pdf", name.to_lowercase()), b"%PDF".to_vec()).await.unwrap();
    }

    let (shutdown, signal) = shutdown_channel();
    shutdown.fire();
    p.worker.start(consumer, signal).unwrap();
    let consumer = p.worker.join().await.unwrap();

    assert_eq!(consumer.pending(), 3);
    for name in ["One", "Two", "Three"] {
        assert_eq!(status_of(&p.store, name).await, PolicyStatus::Pending);
    }

    p.worker.start(consumer, ShutdownSignal::never()).unwrap();
    drop(p.upload);
    let consumer = p.worker.join().await.unwrap();

    assert_eq!(consumer.pending(), 0);
    for name in ["One", "Two", "Three"] {
        assert_eq!(status_of(&p.store, name).await, PolicyStatus::Active);
    }
}

/// Test: Upload after the pipeline is torn down is reported to the uploader
#[tokio::test]
async fn test_upload_after_teardown_fails() {
    let (p, consumer) = pipeline();
    drop(consumer);

    let err = p.upload.upload("Late", "late.pdf", b"%PDF".to_vec()).await.unwrap_err();
    assert!(matches!(err, CoreError::QueueClosed));
    assert_eq!(status_of(&p.store, "Late").await, PolicyStatus::Failed);
}

/// Processor that blocks until released, to observe an in-flight event
struct GateProcessor {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl DocumentProcessor for GateProcessor {
    async fn process(&self, _event: &PolicyIngestEvent) -> anyhow::Result<()> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

/// Test: Stop lets the in-flight document finish and keeps the rest queued
#[tokio::test]
async fn test_stop_finishes_in_flight_document() {
    let store = Arc::new(InMemoryPolicyStore::new());
    let clock = Arc::new(ManualClock::default());
    let gate = Arc::new(GateProcessor {
        started: Notify::new(),
        release: Notify::new(),
    });
    let (queue, consumer) = ingest_queue();
    let upload = UploadService::new(store.clone(), queue, clock.clone());

    let handler = StatusTrackingHandler::new(store.clone(), gate.clone(), clock);
    let mut worker = IngestWorker::with_handler(handler);
    worker.start(consumer, ShutdownSignal::never()).unwrap();

    upload.upload("First", "first.pdf", b"%PDF".to_vec()).await.unwrap();
    upload.upload("Second", "second.pdf", b"%PDF".to_vec()).await.unwrap();

    gate.started.notified().await;
    assert_eq!(status_of(&store, "First").await, PolicyStatus::Processing);

    let release = {
        let gate = gate.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            gate.release.notify_one();
        })
    };

    let consumer = worker.stop().await.unwrap();
    release.await.unwrap();

    assert_eq!(status_of(&store, "First").await, PolicyStatus::Active);
    assert_eq!(status_of(&store, "Second").await, PolicyStatus::Pending);
    assert_eq!(consumer.pending(), 1);
}
