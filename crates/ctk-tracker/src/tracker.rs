//! ---
//! ctk_section: "05-interaction-tracking"
//! ctk_subsection: "page-visit tracker"
//! ctk_type: "source"
//! ctk_scope: "tracker"
//! ctk_description: "Single-visit interaction tracker: latches, counters, grade adoption, exit dedup."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use ctk_delivery::{DeliveryEngine, EventDraft};

use crate::fingerprint::DeviceFingerprint;
use crate::grade::Grade;
use crate::transport::{InteractionEvent, InteractionPayload, TrackAck, TransportCascade};

/// One-shot user actions the tracker reports individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    /// Photo gallery click. Counted locally, never reported on its own.
    Photo,
    /// Contact-line click.
    Line,
    /// Phone-call click.
    Call,
    /// Map open.
    Map,
}

impl InteractionKind {
    fn wire_name(&self) -> &'static str {
        match self {
            InteractionKind::Photo => "click_photos",
            InteractionKind::Line => "click_line",
            InteractionKind::Call => "click_call",
            InteractionKind::Map => "click_map",
        }
    }
}

/// Running action counters for the visit, snapshotted into every payload.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ActionCounters {
    #[serde(rename = "click_photos")]
    pub photo_clicks: u32,
    #[serde(rename = "click_line")]
    pub line_clicks: u32,
    #[serde(rename = "click_call")]
    pub call_clicks: u32,
    #[serde(rename = "click_map")]
    pub map_clicks: u32,
    /// Deepest scroll position reached, in percent.
    #[serde(rename = "scroll_depth")]
    pub scroll_depth_max: u8,
}

/// Per-kind dedup latches. A latch is set synchronously before the first
/// network await for its kind, so a re-entrant call can never slip past it.
#[derive(Debug, Default)]
struct DedupLatches {
    line: bool,
    call: bool,
    map: bool,
    page_exit: bool,
}

/// What a tracked entity the visit belongs to.
#[derive(Debug, Clone)]
pub struct TrackerContext {
    pub property_id: String,
    pub district: String,
    /// Listing agent, when known. The literal `"unknown"` is treated as
    /// absent.
    pub agent_id: Option<String>,
}

/// Result of one report attempt, for callers that want to surface degraded
/// delivery without blocking the user action.
#[derive(Debug, Clone, Copy)]
pub struct InteractionOutcome {
    /// Some transport accepted the report.
    pub sent: bool,
    /// Delivery needed a fallback transport (or lost the report entirely).
    pub degraded: bool,
    /// Grade held after this report.
    pub grade: Grade,
}

/// Tracks one page visit end to end. Owned by a single caller; methods take
/// `&mut self` and latches are plain fields set before any await.
pub struct InteractionTracker {
    ctx: TrackerContext,
    session_id: String,
    fingerprint: String,
    cascade: TransportCascade,
    engine: DeliveryEngine,
    demo: bool,
    entered_at: Instant,
    counters: ActionCounters,
    latches: DedupLatches,
    grade: Grade,
    escalated: bool,
    on_escalation: Option<Box<dyn FnMut(Option<String>) + Send>>,
}

impl InteractionTracker {
    /// Build a tracker for one visit. Call [`begin`](Self::begin) once the
    /// page is actually shown.
    ///
    /// In demo mode the tracker becomes inert: every method is a no-op so
    /// rehearsal sessions never pollute production analytics.
    pub fn new(
        ctx: TrackerContext,
        session_id: impl Into<String>,
        fingerprint: &DeviceFingerprint,
        cascade: TransportCascade,
        engine: DeliveryEngine,
        demo: bool,
    ) -> Self {
        let mut ctx = ctx;
        ctx.agent_id = ctx
            .agent_id
            .filter(|a| !a.is_empty() && a != "unknown");
        Self {
            ctx,
            session_id: session_id.into(),
            fingerprint: fingerprint.encode(),
            cascade,
            engine,
            demo,
            entered_at: Instant::now(),
            counters: ActionCounters::default(),
            latches: DedupLatches::default(),
            grade: Grade::F,
            escalated: false,
            on_escalation: None,
        }
    }

    /// Register a callback fired exactly once, the first time the grade
    /// reaches the top tier.
    pub fn with_escalation(mut self, callback: impl FnMut(Option<String>) + Send + 'static) -> Self {
        self.on_escalation = Some(Box::new(callback));
        self
    }

    /// Grade currently held for this visit.
    pub fn grade(&self) -> Grade {
        self.grade
    }

    /// Counter snapshot, mostly for diagnostics.
    pub fn counters(&self) -> ActionCounters {
        self.counters
    }

    fn page(&self) -> String {
        format!("/property/{}", self.ctx.property_id)
    }

    fn payload(&self, kind: &str) -> InteractionPayload {
        InteractionPayload {
            session_id: self.session_id.clone(),
            agent_id: self.ctx.agent_id.clone(),
            fingerprint: self.fingerprint.clone(),
            event: InteractionEvent {
                kind: kind.to_owned(),
                property_id: self.ctx.property_id.clone(),
                district: self.ctx.district.clone(),
                duration_seconds: self.entered_at.elapsed().as_secs(),
                actions: self.counters,
                focus: Vec::new(),
            },
        }
    }

    /// Report that the visit started. Uses the unload-safe transport so it
    /// cannot stall page setup.
    pub async fn begin(&mut self) {
        if self.demo {
            debug!(target: "ctk::tracker", property_id = %self.ctx.property_id, "demo visit, tracking suppressed");
            return;
        }
        let payload = self.payload("page_view");
        if let Some(transport) = self.cascade.unload_safe() {
            if let Err(err) = transport.attempt(&payload).await {
                warn!(target: "ctk::tracker", error = %err, "page_view send failed");
            }
        }
    }

    /// Record the deepest scroll position seen so far, in percent.
    pub fn record_scroll(&mut self, depth_percent: u8) {
        if self.demo {
            return;
        }
        let depth = depth_percent.min(100);
        if depth > self.counters.scroll_depth_max {
            self.counters.scroll_depth_max = depth;
        }
    }

    /// Count a photo gallery click. Photo clicks never produce their own
    /// report; the count rides along on the next reported payload.
    pub fn record_photo_click(&mut self) {
        if self.demo {
            return;
        }
        self.counters.photo_clicks += 1;
    }

    /// Report a one-shot interaction. Repeats of the same kind within the
    /// visit are latched out locally and never reach the network.
    pub async fn record_interaction(&mut self, kind: InteractionKind) -> InteractionOutcome {
        if self.demo {
            return self.outcome(false, false);
        }
        if let InteractionKind::Photo = kind {
            self.record_photo_click();
            return self.outcome(false, false);
        }

        let latched = match kind {
            InteractionKind::Line => std::mem::replace(&mut self.latches.line, true),
            InteractionKind::Call => std::mem::replace(&mut self.latches.call, true),
            InteractionKind::Map => std::mem::replace(&mut self.latches.map, true),
            InteractionKind::Photo => unreachable!("handled above"),
        };
        if latched {
            debug!(
                target: "ctk::tracker",
                kind = kind.wire_name(),
                property_id = %self.ctx.property_id,
                "duplicate interaction blocked by latch"
            );
            return self.outcome(false, false);
        }

        match kind {
            InteractionKind::Line => self.counters.line_clicks += 1,
            InteractionKind::Call => self.counters.call_clicks += 1,
            InteractionKind::Map => self.counters.map_clicks += 1,
            InteractionKind::Photo => unreachable!("handled above"),
        }

        let payload = self.payload(kind.wire_name());
        let result = self.cascade.attempt(&payload).await;
        if let Some(ack) = &result.ack {
            self.adopt(ack);
        }
        self.outcome(result.delivered, result.degraded)
    }

    /// Report that the visit ended. Safe to call from multiple teardown
    /// signals; only the first call sends.
    pub async fn record_exit(&mut self) {
        if self.demo {
            return;
        }
        if std::mem::replace(&mut self.latches.page_exit, true) {
            debug!(target: "ctk::tracker", property_id = %self.ctx.property_id, "duplicate page_exit blocked");
            self.diagnostic("tracker.page_exit_dedupe_blocked");
            return;
        }
        self.diagnostic("tracker.page_exit_sent");

        let payload = self.payload("page_exit");
        if let Some(transport) = self.cascade.unload_safe() {
            if let Err(err) = transport.attempt(&payload).await {
                warn!(target: "ctk::tracker", error = %err, "page_exit send failed");
            }
        }
    }

    /// Queue a low-volume diagnostic event through the durable pipeline.
    fn diagnostic(&self, event: &str) {
        let draft = EventDraft::new(event, self.page());
        if let Err(err) = self.engine.enqueue(draft) {
            warn!(target: "ctk::tracker", error = %err, event, "diagnostic event rejected");
        }
    }

    /// Adopt a server-assigned grade, monotonically. The escalation callback
    /// fires only the first time the visit crosses into the top tier.
    fn adopt(&mut self, ack: &TrackAck) {
        if !ack.success {
            return;
        }
        let Some(raw) = ack.grade.as_deref() else {
            return;
        };
        let assigned = Grade::parse_lenient(raw);
        if assigned <= self.grade {
            return;
        }
        self.grade = assigned;
        if assigned.is_top() && !self.escalated {
            self.escalated = true;
            info!(
                target: "ctk::tracker",
                property_id = %self.ctx.property_id,
                reason = ack.reason.as_deref().unwrap_or(""),
                "visit escalated to top grade"
            );
            if let Some(callback) = self.on_escalation.as_mut() {
                callback(ack.reason.clone());
            }
        }
    }

    fn outcome(&self, sent: bool, degraded: bool) -> InteractionOutcome {
        InteractionOutcome {
            sent,
            degraded,
            grade: self.grade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use ctk_common::DeliveryConfig;
    use ctk_delivery::{
        BatchAck, BatchTransport, StoredEvent, TransportError, QUEUE_KEY,
    };
    use ctk_storage::{DefensiveStore, KeyValueStore, MemoryStore};

    use crate::transport::InteractionTransport;

    struct NullBatch;

    #[async_trait]
    impl BatchTransport for NullBatch {
        async fn send_batch(&self, _events: &[StoredEvent]) -> Result<BatchAck, TransportError> {
            Ok(BatchAck::default())
        }
    }

    struct MockAware {
        acks: Mutex<VecDeque<Result<TrackAck, ()>>>,
        calls: AtomicUsize,
    }

    impl MockAware {
        fn with(acks: Vec<Result<TrackAck, ()>>) -> Arc<Self> {
            Arc::new(Self {
                acks: Mutex::new(acks.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn ack(grade: &str) -> Result<TrackAck, ()> {
            Ok(TrackAck {
                success: true,
                grade: Some(grade.to_owned()),
                reason: Some("scored".to_owned()),
            })
        }
    }

    #[async_trait]
    impl InteractionTransport for MockAware {
        fn response_aware(&self) -> bool {
            true
        }

        async fn attempt(
            &self,
            _payload: &InteractionPayload,
        ) -> Result<Option<TrackAck>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.acks.lock().pop_front() {
                Some(Ok(ack)) => Ok(Some(ack)),
                Some(Err(())) => Err(TransportError::Status(500)),
                None => Ok(Some(TrackAck::default())),
            }
        }
    }

    struct MockBeacon {
        sent: Mutex<Vec<InteractionPayload>>,
    }

    impl MockBeacon {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn kinds(&self) -> Vec<String> {
            self.sent.lock().iter().map(|p| p.event.kind.clone()).collect()
        }
    }

    #[async_trait]
    impl InteractionTransport for MockBeacon {
        fn response_aware(&self) -> bool {
            false
        }

        async fn attempt(
            &self,
            payload: &InteractionPayload,
        ) -> Result<Option<TrackAck>, TransportError> {
            self.sent.lock().push(payload.clone());
            Ok(None)
        }
    }

    fn tracker_with(
        cascade: TransportCascade,
        demo: bool,
    ) -> (InteractionTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = DeliveryEngine::new(
            DefensiveStore::new(store.clone()),
            Arc::new(NullBatch),
            "u_abc123def",
            &DeliveryConfig::default(),
        );
        let ctx = TrackerContext {
            property_id: "4711".to_owned(),
            district: "mitte".to_owned(),
            agent_id: Some("unknown".to_owned()),
        };
        let tracker = InteractionTracker::new(
            ctx,
            "u_abc123def",
            &DeviceFingerprint::unknown(),
            cascade,
            engine,
            demo,
        );
        (tracker, store)
    }

    fn queued_events(store: &MemoryStore) -> Vec<String> {
        match store.get(QUEUE_KEY) {
            Ok(Some(raw)) => {
                let events: Vec<StoredEvent> = serde_json::from_str(&raw).unwrap();
                events.into_iter().map(|e| e.event).collect()
            }
            _ => Vec::new(),
        }
    }

    #[tokio::test]
    async fn exit_sends_once_and_records_duplicates() {
        let beacon = MockBeacon::new();
        let cascade = TransportCascade::new(vec![beacon.clone()]);
        let (mut tracker, store) = tracker_with(cascade, false);

        tracker.begin().await;
        tracker.record_exit().await;
        tracker.record_exit().await;

        assert_eq!(beacon.kinds(), vec!["page_view", "page_exit"]);
        let events = queued_events(&store);
        assert_eq!(
            events,
            vec!["tracker.page_exit_sent", "tracker.page_exit_dedupe_blocked"]
        );
    }

    #[tokio::test]
    async fn grade_adoption_is_monotonic_with_single_escalation() {
        let aware = MockAware::with(vec![
            MockAware::ack("C"),
            MockAware::ack("S"),
            MockAware::ack("A"),
        ]);
        let cascade = TransportCascade::new(vec![aware.clone()]);
        let escalations = Arc::new(AtomicUsize::new(0));
        let counter = escalations.clone();
        let (tracker, _store) = tracker_with(cascade, false);
        let mut tracker = tracker.with_escalation(move |reason| {
            assert_eq!(reason.as_deref(), Some("scored"));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let first = tracker.record_interaction(InteractionKind::Line).await;
        assert_eq!(first.grade, Grade::C);

        let second = tracker.record_interaction(InteractionKind::Call).await;
        assert_eq!(second.grade, Grade::S);

        // Lower grade after the top tier never demotes.
        let third = tracker.record_interaction(InteractionKind::Map).await;
        assert_eq!(third.grade, Grade::S);

        assert_eq!(escalations.load(Ordering::SeqCst), 1);
        assert_eq!(aware.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn duplicate_interaction_kind_is_latched() {
        let aware = MockAware::with(vec![MockAware::ack("B")]);
        let cascade = TransportCascade::new(vec![aware.clone()]);
        let (mut tracker, _store) = tracker_with(cascade, false);

        let first = tracker.record_interaction(InteractionKind::Line).await;
        assert!(first.sent);
        let second = tracker.record_interaction(InteractionKind::Line).await;
        assert!(!second.sent);

        assert_eq!(aware.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.counters().line_clicks, 1);
    }

    #[tokio::test]
    async fn failed_transport_falls_back_to_beacon() {
        let aware = MockAware::with(vec![Err(())]);
        let beacon = MockBeacon::new();
        let cascade = TransportCascade::new(vec![aware, beacon.clone()]);
        let (mut tracker, _store) = tracker_with(cascade, false);

        let outcome = tracker.record_interaction(InteractionKind::Call).await;
        assert!(outcome.sent);
        assert!(outcome.degraded);
        assert_eq!(beacon.kinds(), vec!["click_call"]);
    }

    #[tokio::test]
    async fn demo_mode_is_fully_inert() {
        let aware = MockAware::with(vec![MockAware::ack("S")]);
        let beacon = MockBeacon::new();
        let cascade = TransportCascade::new(vec![aware.clone(), beacon.clone()]);
        let (mut tracker, store) = tracker_with(cascade, true);

        tracker.begin().await;
        tracker.record_photo_click();
        tracker.record_scroll(80);
        let outcome = tracker.record_interaction(InteractionKind::Line).await;
        tracker.record_exit().await;

        assert!(!outcome.sent);
        assert_eq!(aware.calls.load(Ordering::SeqCst), 0);
        assert!(beacon.kinds().is_empty());
        assert!(queued_events(&store).is_empty());
        assert_eq!(tracker.counters().photo_clicks, 0);
    }

    #[tokio::test]
    async fn photo_clicks_ride_along_on_reports() {
        let aware = MockAware::with(vec![MockAware::ack("B")]);
        let cascade = TransportCascade::new(vec![aware.clone()]);
        let (mut tracker, _store) = tracker_with(cascade, false);

        tracker.record_photo_click();
        tracker.record_photo_click();
        let outcome = tracker.record_interaction(InteractionKind::Photo).await;
        assert!(!outcome.sent);
        assert_eq!(aware.calls.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.counters().photo_clicks, 3);

        tracker.record_scroll(45);
        tracker.record_scroll(30);
        tracker.record_interaction(InteractionKind::Map).await;
        let sent = aware.calls.load(Ordering::SeqCst);
        assert_eq!(sent, 1);
        assert_eq!(tracker.counters().scroll_depth_max, 45);
    }

    #[test]
    fn unknown_agent_is_dropped() {
        let cascade = TransportCascade::new(vec![]);
        let (tracker, _store) = tracker_with(cascade, false);
        assert!(tracker.ctx.agent_id.is_none());
    }

    #[test]
    fn grade_sequence_settles_at_top_with_one_escalation() {
        let escalations = Arc::new(AtomicUsize::new(0));
        let counter = escalations.clone();
        let cascade = TransportCascade::new(vec![]);
        let (tracker, _store) = tracker_with(cascade, false);
        let mut tracker = tracker.with_escalation(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for grade in ["C", "B", "A", "B", "S", "S"] {
            tracker.adopt(&TrackAck {
                success: true,
                grade: Some(grade.to_owned()),
                reason: None,
            });
        }
        assert_eq!(tracker.grade(), Grade::S);
        assert_eq!(escalations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsuccessful_ack_never_assigns_a_grade() {
        let cascade = TransportCascade::new(vec![]);
        let (mut tracker, _store) = tracker_with(cascade, false);
        tracker.adopt(&TrackAck {
            success: false,
            grade: Some("S".to_owned()),
            reason: None,
        });
        assert_eq!(tracker.grade(), Grade::F);
    }
}
