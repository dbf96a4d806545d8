//! ---
//! ctk_section: "04-event-delivery"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Durable at-least-once event delivery."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::Result;

/// Metrics published by the delivery subsystem.
#[derive(Clone)]
pub struct DeliveryMetrics {
    registry: Arc<Registry>,
    queue_depth: IntGauge,
    events_dropped_total: IntCounter,
    flushes_total: IntCounterVec,
}

impl DeliveryMetrics {
    /// Register the delivery metric family against the provided registry.
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let queue_depth = IntGauge::with_opts(Opts::new(
            "ctk_delivery_queue_depth",
            "Number of events currently awaiting delivery",
        ))?;
        registry.register(Box::new(queue_depth.clone()))?;

        let events_dropped_total = IntCounter::with_opts(Opts::new(
            "ctk_delivery_events_dropped_total",
            "Events discarded because the queue cap was exceeded",
        ))?;
        registry.register(Box::new(events_dropped_total.clone()))?;

        let flushes_total = IntCounterVec::new(
            Opts::new(
                "ctk_delivery_flushes_total",
                "Batch flush attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(flushes_total.clone()))?;

        Ok(Self {
            registry,
            queue_depth,
            events_dropped_total,
            flushes_total,
        })
    }

    /// Expose the underlying registry for convenience.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Record the current queue depth.
    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }

    /// Count events dropped by the cap.
    pub fn add_dropped(&self, dropped: usize) {
        self.events_dropped_total.inc_by(dropped as u64);
    }

    /// Count one flush attempt.
    pub fn record_flush(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.flushes_total.with_label_values(&[outcome]).inc();
    }
}

impl std::fmt::Debug for DeliveryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryMetrics").finish_non_exhaustive()
    }
}
