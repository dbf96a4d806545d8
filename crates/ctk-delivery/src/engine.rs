//! ---
//! ctk_section: "04-event-delivery"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Durable at-least-once event delivery."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ctk_common::DeliveryConfig;
use ctk_storage::DefensiveStore;

use crate::backoff::Backoff;
use crate::event::{EventDraft, StoredEvent};
use crate::metrics::DeliveryMetrics;
use crate::queue::DurableQueue;
use crate::transport::BatchTransport;
use crate::Result;

/// Durable, at-least-once event delivery engine.
///
/// One long-lived instance per page/session, owned explicitly by the
/// embedding application and injected into consumers (no ambient global
/// queue). Cheap to clone; clones share the same queue and ticker.
#[derive(Clone)]
pub struct DeliveryEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    session_id: String,
    queue: Mutex<DurableQueue>,
    backoff: Mutex<Backoff>,
    transport: Arc<dyn BatchTransport>,
    metrics: Option<DeliveryMetrics>,
}

impl DeliveryEngine {
    /// Build an engine over the given store and transport, restoring any
    /// persisted queue.
    pub fn new(
        store: DefensiveStore,
        transport: Arc<dyn BatchTransport>,
        session_id: impl Into<String>,
        config: &DeliveryConfig,
    ) -> Self {
        let queue = DurableQueue::load(store, config.queue_cap);
        Self {
            inner: Arc::new(EngineInner {
                session_id: session_id.into(),
                queue: Mutex::new(queue),
                backoff: Mutex::new(Backoff::new(config.backoff_floor, config.backoff_ceiling)),
                transport,
                metrics: None,
            }),
        }
    }

    /// Attach delivery metrics. Must be called before cloning the engine
    /// into consumers.
    pub fn with_metrics(mut self, metrics: DeliveryMetrics) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("with_metrics must be called before the engine is shared");
        inner.metrics = Some(metrics);
        self
    }

    /// Session id stamped on every event this engine accepts.
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Number of events currently awaiting delivery.
    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Validate, persist, and queue an event without an immediate flush
    /// attempt; the scheduled tick will pick it up.
    pub fn enqueue(&self, draft: EventDraft) -> Result<Uuid> {
        self.inner.admit(draft)
    }

    /// Validate, persist, and queue an event, then attempt an immediate
    /// single-event flush in parallel with the scheduled batch tick.
    ///
    /// The common case (one event, healthy network) is delivered with low
    /// latency; if the immediate attempt fails the durable queue still
    /// guarantees delivery.
    pub fn enqueue_and_send_immediately(&self, draft: EventDraft) -> Result<Uuid> {
        let request_id = self.inner.admit(draft)?;
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.flush_single(request_id).await;
        });
        Ok(request_id)
    }

    /// Flush the entire current queue snapshot once. Returns `true` when
    /// the backend acknowledged the batch (or the queue was empty).
    pub async fn flush_now(&self) -> bool {
        self.inner.flush_batch().await
    }

    /// Start the retry ticker. One ticker per engine; shut the handle
    /// down on teardown so the timer never fires against a stale
    /// context.
    pub fn spawn_ticker(&self) -> EngineHandle {
        let inner = self.inner.clone();
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                let delay = inner.backoff.lock().next_delay();
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = sleep(delay) => {}
                }
                inner.flush_batch().await;
            }
        });
        info!(target: "ctk::delivery::engine", "delivery ticker started");
        EngineHandle { shutdown, task }
    }
}

impl std::fmt::Debug for DeliveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("session_id", &self.inner.session_id)
            .field("queue_len", &self.queue_len())
            .finish_non_exhaustive()
    }
}

impl EngineInner {
    fn admit(&self, draft: EventDraft) -> Result<Uuid> {
        let event = StoredEvent::from_draft(draft, &self.session_id, Utc::now())?;
        let request_id = event.request_id;
        let (dropped, depth) = {
            let mut queue = self.queue.lock();
            let dropped = queue.push(event);
            (dropped, queue.len())
        };
        if let Some(metrics) = &self.metrics {
            if dropped > 0 {
                metrics.add_dropped(dropped);
            }
            metrics.set_queue_depth(depth);
        }
        Ok(request_id)
    }

    /// Immediate single-event attempt. Failure is non-fatal: the event
    /// stays queued for the scheduled tick, and the backoff is untouched
    /// (only scheduled flushes drive it upward).
    async fn flush_single(&self, request_id: Uuid) {
        let Some(event) = self
            .queue
            .lock()
            .snapshot()
            .into_iter()
            .find(|event| event.request_id == request_id)
        else {
            // Already delivered by a racing batch flush.
            return;
        };

        match self.transport.send_batch(std::slice::from_ref(&event)).await {
            Ok(ack) => {
                self.queue.lock().remove_ids(&HashSet::from([request_id]));
                let mut backoff = self.backoff.lock();
                backoff.on_success();
                if let Some(suggested) = ack.retry_after {
                    backoff.override_next(suggested);
                }
                drop(backoff);
                self.observe(true);
                debug!(target: "ctk::delivery::engine", %request_id, "immediate flush delivered");
            }
            Err(err) => {
                self.observe(false);
                debug!(target: "ctk::delivery::engine", %request_id, error = %err, "immediate flush failed; event remains queued");
            }
        }
    }

    /// Scheduled batch flush: send the entire snapshot, and on success
    /// remove exactly the snapshot's ids so events enqueued during the
    /// in-flight request survive.
    async fn flush_batch(&self) -> bool {
        let snapshot = self.queue.lock().snapshot();
        if snapshot.is_empty() {
            return true;
        }

        match self.transport.send_batch(&snapshot).await {
            Ok(ack) => {
                let ids: HashSet<Uuid> = snapshot.iter().map(|event| event.request_id).collect();
                let removed = self.queue.lock().remove_ids(&ids);
                let mut backoff = self.backoff.lock();
                backoff.on_success();
                if let Some(suggested) = ack.retry_after {
                    backoff.override_next(suggested);
                }
                drop(backoff);
                self.observe(true);
                debug!(target: "ctk::delivery::engine", removed, "batch flush acknowledged");
                true
            }
            Err(err) => {
                let mut backoff = self.backoff.lock();
                backoff.on_failure();
                let next = backoff.current();
                drop(backoff);
                self.observe(false);
                warn!(
                    target: "ctk::delivery::engine",
                    batch = snapshot.len(),
                    error = %err,
                    next_retry = ?next,
                    "batch flush failed; queue untouched"
                );
                false
            }
        }
    }

    fn observe(&self, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_flush(success);
            metrics.set_queue_depth(self.queue.lock().len());
        }
    }
}

/// Handle over the engine's retry ticker.
pub struct EngineHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Request shutdown and wait for the ticker task to finish.
    pub async fn shutdown(mut self) -> std::result::Result<(), tokio::task::JoinError> {
        let _ = self.shutdown.send(true);
        (&mut self.task).await
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
    }
}
