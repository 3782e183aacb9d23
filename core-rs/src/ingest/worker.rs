//! IngestWorker - single consumer draining the ingestion queue
//!
//! Lifecycle: `Stopped -> Running -> Draining -> Stopped`.
//! - Events are handled strictly one at a time in FIFO order
//! - Each event gets a fresh handler from the [`HandlerScope`], run in its own task
//! - A failing or panicking handler is logged with the policy identity and the loop moves on
//! - No retry, no requeue, no dead letter: delivery is at most once
//! - Cancellation is observed only while waiting for the next event
//!
//! The queue is in memory. A process crash loses pending and in-flight events.
//! There is no per-event timeout; a hung handler stalls the queue.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use super::event::PolicyIngestEvent;
use super::handler::{HandlerScope, IngestHandler, SharedScope};
use super::queue::IngestConsumer;
use super::shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
use crate::errors::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    Stopped,
    Running,
    Draining,
}

impl WorkerState {
    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Stopped => 0,
            WorkerState::Running => 1,
            WorkerState::Draining => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Running,
            2 => WorkerState::Draining,
            _ => WorkerState::Stopped,
        }
    }
}

/// Per-worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Events handed to a handler
    pub delivered: u64,
    pub succeeded: u64,
    /// Handler returned an error or panicked
    pub failed: u64,
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    delivered: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    /// Handler task of the event being processed, if any
    in_flight: Mutex<Option<AbortHandle>>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            state: AtomicU8::new(WorkerState::Stopped.as_u8()),
            delivered: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    fn set_in_flight(&self, handle: Option<AbortHandle>) {
        *self.in_flight.lock().unwrap_or_else(|p| p.into_inner()) = handle;
    }

    /// Abort the current handler task. Returns true if one was running.
    fn abort_in_flight(&self) -> bool {
        match self.in_flight.lock().unwrap_or_else(|p| p.into_inner()).take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Running -> Draining; any other state is left alone
    fn begin_drain(&self) {
        let _ = self.state.compare_exchange(
            WorkerState::Running.as_u8(),
            WorkerState::Draining.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

pub struct IngestWorker {
    scope: Arc<dyn HandlerScope>,
    shared: Arc<Shared>,
    stop: Option<ShutdownTrigger>,
    task: Option<JoinHandle<IngestConsumer>>,
}

impl std::fmt::Debug for IngestWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestWorker")
            .field("scope", &"<HandlerScope>")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .field("attached", &self.task.is_some())
            .finish()
    }
}

impl IngestWorker {
    pub fn new(scope: Arc<dyn HandlerScope>) -> Self {
        IngestWorker {
            scope,
            shared: Arc::new(Shared::new()),
            stop: None,
            task: None,
        }
    }

    /// Worker sharing one stateless handler across events
    pub fn with_handler<H: IngestHandler + 'static>(handler: H) -> Self {
        Self::new(Arc::new(SharedScope::new(handler)))
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            delivered: self.shared.delivered.load(Ordering::SeqCst),
            succeeded: self.shared.succeeded.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
        }
    }

    /// True if no loop task is attached or the attached one has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Spawn the consume loop.
    ///
    /// # Arguments
    /// * `consumer` - The queue's single consumer half
    /// * `shutdown` - Host cancellation; observed while waiting for the next event
    ///
    /// # Errors
    /// [`CoreError::WorkerState`] if a loop task is still attached (call `stop` or `join` first).
    pub fn start(&mut self, consumer: IngestConsumer, shutdown: ShutdownSignal) -> Result<()> {
        if self.task.is_some() {
            return Err(CoreError::WorkerState(format!(
                "cannot start worker in state {:?}: loop task still attached",
                self.state()
            )));
        }

        let (stop_trigger, stop_signal) = shutdown_channel();
        self.shared.set_state(WorkerState::Running);

        let consume = ConsumeLoop {
            scope: Arc::clone(&self.scope),
            shared: Arc::clone(&self.shared),
            consumer,
            stop: stop_signal,
            shutdown,
        };

        info!(pending = consume.consumer.pending(), "[IngestWorker] Starting");

        self.task = Some(tokio::spawn(consume.run()));
        self.stop = Some(stop_trigger);
        Ok(())
    }

    /// Signal the loop and wait for it to exit.
    ///
    /// The loop leaves at its next suspension point without draining. An event
    /// already in progress runs to completion first. Returns the consumer with
    /// any undelivered events still queued.
    pub async fn stop(&mut self) -> Result<IngestConsumer> {
        let task = self.detach()?;
        self.signal_stop();
        self.await_loop(task).await
    }

    /// Like [`IngestWorker::stop`], but abandons the loop if it has not exited
    /// within `grace`. The loop task and the in-flight handler task are both
    /// aborted; the event's outcome is then unspecified and undelivered events
    /// are lost (`Ok(None)`).
    pub async fn stop_with_grace(&mut self, grace: Duration) -> Result<Option<IngestConsumer>> {
        let mut task = self.detach()?;
        self.signal_stop();

        match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => self.finish(joined).map(Some),
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "[IngestWorker] Grace period elapsed, abandoning loop");
                task.abort();
                // Once the loop is gone it cannot spawn another handler.
                let _ = task.await;
                if self.shared.abort_in_flight() {
                    warn!("[IngestWorker] In-flight handler aborted");
                }
                self.shared.set_state(WorkerState::Stopped);
                Ok(None)
            }
        }
    }

    /// Wait for the loop to end on its own (host shutdown signal, or every
    /// producer dropped and the queue drained) without signalling it.
    pub async fn join(&mut self) -> Result<IngestConsumer> {
        let task = self.detach()?;
        self.stop = None;
        self.await_loop(task).await
    }

    fn detach(&mut self) -> Result<JoinHandle<IngestConsumer>> {
        self.task
            .take()
            .ok_or_else(|| CoreError::WorkerState("worker is not running".to_string()))
    }

    fn signal_stop(&mut self) {
        self.shared.begin_drain();
        if let Some(trigger) = self.stop.take() {
            trigger.fire();
        }
    }

    async fn await_loop(&mut self, task: JoinHandle<IngestConsumer>) -> Result<IngestConsumer> {
        let joined = task.await;
        self.finish(joined)
    }

    fn finish(&mut self, joined: std::result::Result<IngestConsumer, tokio::task::JoinError>) -> Result<IngestConsumer> {
        self.shared.set_state(WorkerState::Stopped);

        match joined {
            Ok(consumer) => {
                info!(
                    pending = consumer.pending(),
                    stats = ?self.stats(),
                    "[IngestWorker] Stopped"
                );
                Ok(consumer)
            }
            Err(e) => Err(CoreError::WorkerState(format!("worker loop failed: {}", e))),
        }
    }
}

impl Drop for IngestWorker {
    fn drop(&mut self) {
        if let Some(trigger) = self.stop.take() {
            trigger.fire();
        }
    }
}

enum Next {
    Event(PolicyIngestEvent),
    Cancelled,
    Closed,
}

struct ConsumeLoop {
    scope: Arc<dyn HandlerScope>,
    shared: Arc<Shared>,
    consumer: IngestConsumer,
    stop: ShutdownSignal,
    shutdown: ShutdownSignal,
}

impl ConsumeLoop {
    async fn run(mut self) -> IngestConsumer {
        loop {
            // Cancellation wins over a ready event: stopping does not drain.
            let next = tokio::select! {
                biased;
                _ = self.stop.cancelled() => Next::Cancelled,
                _ = self.shutdown.cancelled() => Next::Cancelled,
                event = self.consumer.dequeue() => match event {
                    Some(event) => Next::Event(event),
                    None => Next::Closed,
                },
            };

            match next {
                Next::Event(event) => dispatch(self.scope.as_ref(), &self.shared, event).await,
                Next::Cancelled => {
                    self.shared.begin_drain();
                    info!(
                        pending = self.consumer.pending(),
                        "[IngestWorker] Shutdown signal received, exiting without draining"
                    );
                    break;
                }
                Next::Closed => {
                    info!("[IngestWorker] Queue closed and drained, exiting");
                    break;
                }
            }
        }

        self.shared.set_state(WorkerState::Stopped);
        self.consumer
    }
}

async fn dispatch(scope: &dyn HandlerScope, shared: &Shared, event: PolicyIngestEvent) {
    let policy_id = event.policy_id();
    let policy_name = event.policy_name().to_string();
    let handler = scope.begin();

    shared.delivered.fetch_add(1, Ordering::SeqCst);
    debug!(
        policy_id = %policy_id,
        policy_name = %policy_name,
        size = event.size(),
        "[IngestWorker] Dispatching event"
    );

    // Own task per event: a panic stays inside it.
    let task = tokio::spawn(async move { handler.handle(event).await });
    shared.set_in_flight(Some(task.abort_handle()));
    let outcome = task.await;
    shared.set_in_flight(None);

    match outcome {
        Ok(Ok(())) => {
            shared.succeeded.fetch_add(1, Ordering::SeqCst);
            debug!(policy_id = %policy_id, policy_name = %policy_name, "[IngestWorker] Event processed");
        }
        Ok(Err(e)) => {
            shared.failed.fetch_add(1, Ordering::SeqCst);
            let reason = format!("{:#}", e);
            error!(
                policy_id = %policy_id,
                policy_name = %policy_name,
                error = %reason,
                "[IngestWorker] Handler failed, event dropped"
            );
        }
        Err(e) => {
            shared.failed.fetch_add(1, Ordering::SeqCst);
            let reason = if e.is_panic() { "handler panicked" } else { "handler task cancelled" };
            error!(
                policy_id = %policy_id,
                policy_name = %policy_name,
                error = reason,
                "[IngestWorker] Handler aborted, event dropped"
            );
        }
    }
}
