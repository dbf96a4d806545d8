//! ---
//! ctk_section: "03-session-identity"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "TTL-bound tokens and page-mode resolution."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use ctk_storage::{DebouncedSync, DefensiveStore};

use crate::ttl::{write_verified, TtlPolicy};

/// Storage key gating the temporary demo product mode.
pub const DEMO_KEY: &str = "ctk.demo";

/// Persisted payload: `{"t": <epoch-ms>}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct DemoStamp {
    t: i64,
}

/// The demo flag: a TTL-bound token whose value is its own activation
/// timestamp. Live for two hours after activation (configurable).
#[derive(Debug, Clone)]
pub struct DemoFlag {
    store: DefensiveStore,
    policy: TtlPolicy,
}

impl DemoFlag {
    /// Bind the flag to a store with the given lifetime.
    pub fn new(store: DefensiveStore, ttl: Duration) -> Self {
        Self {
            store,
            policy: TtlPolicy::new(ttl),
        }
    }

    /// Bind the flag using the workspace session configuration.
    pub fn from_config(store: DefensiveStore, config: &ctk_common::SessionConfig) -> Self {
        Self::new(store, config.demo_ttl)
    }

    /// The lifetime policy in force.
    pub fn policy(&self) -> TtlPolicy {
        self.policy
    }

    /// Read the activation timestamp. A payload that fails to parse is
    /// deleted before returning `None`, so repeated reads of a corrupted
    /// entry do not repeat the parse cost.
    pub fn read_timestamp(&self) -> Option<i64> {
        let raw = self.store.get(DEMO_KEY)?;
        match serde_json::from_str::<DemoStamp>(&raw) {
            Ok(stamp) => Some(stamp.t),
            Err(err) => {
                warn!(target: "ctk::session::demo", error = %err, "corrupt demo payload removed");
                self.store.remove(DEMO_KEY);
                None
            }
        }
    }

    /// Activate demo mode at `now_ms`. Returns `true` only when the
    /// write-then-read-back verification succeeds; a `false` means the
    /// store silently refused the write and the flag must be treated as
    /// not set.
    pub fn activate(&self, now_ms: i64) -> bool {
        let payload = match serde_json::to_string(&DemoStamp { t: now_ms }) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target: "ctk::session::demo", error = %err, "demo payload serialisation failed");
                return false;
            }
        };
        let verified = write_verified(&self.store, DEMO_KEY, &payload);
        if verified {
            info!(target: "ctk::session::demo", activated_at = now_ms, "demo mode activated");
        } else {
            warn!(target: "ctk::session::demo", "demo activation write could not be verified");
        }
        verified
    }

    /// Remove the flag.
    pub fn clear(&self) {
        self.store.remove(DEMO_KEY);
    }

    /// Remaining demo lifetime at `now_ms`; zero once expired or absent.
    pub fn remaining(&self, now_ms: i64) -> Duration {
        match self.read_timestamp() {
            Some(written_at) => self.policy.remaining(written_at, now_ms),
            None => Duration::ZERO,
        }
    }

    /// Whether demo mode is live at `now_ms`.
    pub fn is_live(&self, now_ms: i64) -> bool {
        !self.remaining(now_ms).is_zero()
    }

    /// Remaining lifetime rounded up to whole minutes; drives countdown
    /// copy ("demo ends in N minutes") and the warning schedule.
    pub fn remaining_whole_minutes(&self, now_ms: i64) -> u64 {
        let remaining = self.remaining(now_ms);
        if remaining.is_zero() {
            return 0;
        }
        remaining.as_millis().div_ceil(60_000) as u64
    }

    /// Subscribe to cross-tab resync for this flag's key. Returns `None`
    /// when the store has no signal hub attached.
    pub fn subscribe_sync<F>(&self, window: Duration, on_resync: F) -> Option<DebouncedSync>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let hub = self.store.hub()?;
        Some(DebouncedSync::spawn(hub, DEMO_KEY, window, on_resync))
    }
}

/// Pre-expiry warning and hard-expiry timers for an active demo session.
///
/// One pair per active session, re-armed on mode change and cancelled
/// explicitly on teardown so neither timer fires against a stale context.
pub struct DemoTimers {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DemoTimers {
    /// Arm both timers against the flag's current remaining lifetime.
    ///
    /// The warning callback fires `lead` before expiry (skipped when the
    /// session is already inside the lead window); the expiry callback
    /// fires at T=0. Callbacks run on the timer task.
    pub fn arm<W, E>(flag: &DemoFlag, now_ms: i64, lead: Duration, on_warning: W, on_expiry: E) -> Self
    where
        W: FnOnce() + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let remaining = flag.remaining(now_ms);
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            if remaining.is_zero() {
                on_expiry();
                return;
            }
            if remaining > lead {
                tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    _ = sleep(remaining - lead) => on_warning(),
                }
                tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    _ = sleep(lead) => on_expiry(),
                }
            } else {
                debug!(target: "ctk::session::demo", remaining_ms = remaining.as_millis() as u64, "inside warning lead; scheduling expiry only");
                tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    _ = sleep(remaining) => on_expiry(),
                }
            }
        });

        Self { shutdown, task }
    }

    /// Cancel both timers.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for DemoTimers {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctk_storage::{FaultMode, FaultyStore, MemoryStore, SignalHub};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(7200);
    const HOUR_MS: i64 = 3_600_000;

    fn memory_flag() -> DemoFlag {
        DemoFlag::new(DefensiveStore::new(Arc::new(MemoryStore::new())), TTL)
    }

    #[test]
    fn activate_then_read_round_trips() {
        let flag = memory_flag();
        assert!(flag.activate(1_000));
        assert_eq!(flag.read_timestamp(), Some(1_000));
        assert!(flag.is_live(1_000));
    }

    #[test]
    fn expires_at_exactly_ttl() {
        let flag = memory_flag();
        assert!(flag.activate(0));
        assert!(flag.is_live(2 * HOUR_MS - 1));
        assert!(!flag.is_live(2 * HOUR_MS));
        assert_eq!(flag.remaining(3 * HOUR_MS), Duration::ZERO);
    }

    #[test]
    fn corrupt_payload_is_deleted_on_read() {
        let store = DefensiveStore::new(Arc::new(MemoryStore::new()));
        store.set(DEMO_KEY, "{invalid-json");
        let flag = DemoFlag::new(store.clone(), TTL);

        assert_eq!(flag.read_timestamp(), None);
        assert_eq!(store.get(DEMO_KEY), None);
    }

    #[test]
    fn activation_fails_on_silent_write_drop() {
        let raw = Arc::new(FaultyStore::new(MemoryStore::new()));
        raw.set_mode(FaultMode::SilentDropWrites);
        let flag = DemoFlag::new(DefensiveStore::new(raw), TTL);

        assert!(!flag.activate(0));
        assert!(!flag.is_live(0));
    }

    #[test]
    fn whole_minutes_round_up() {
        let flag = memory_flag();
        assert!(flag.activate(0));
        assert_eq!(flag.remaining_whole_minutes(0), 120);
        // 1 ms of lifetime left still reads as one minute.
        assert_eq!(flag.remaining_whole_minutes(2 * HOUR_MS - 1), 1);
        assert_eq!(flag.remaining_whole_minutes(2 * HOUR_MS), 0);
    }

    #[test]
    fn clear_removes_the_flag() {
        let flag = memory_flag();
        assert!(flag.activate(0));
        flag.clear();
        assert_eq!(flag.read_timestamp(), None);
    }

    #[tokio::test]
    async fn timers_fire_warning_then_expiry() {
        let store = DefensiveStore::new(Arc::new(MemoryStore::new()));
        let flag = DemoFlag::new(store, Duration::from_millis(80));
        assert!(flag.activate(0));

        let order = Arc::new(EventOrder::default());
        let warn_order = order.clone();
        let exp_order = order.clone();
        let _timers = DemoTimers::arm(
            &flag,
            0,
            Duration::from_millis(40),
            move || warn_order.push("warning"),
            move || exp_order.push("expiry"),
        );

        sleep(Duration::from_millis(200)).await;
        assert_eq!(order.snapshot(), vec!["warning", "expiry"]);
    }

    #[tokio::test]
    async fn cancelled_timers_stay_silent() {
        let store = DefensiveStore::new(Arc::new(MemoryStore::new()));
        let flag = DemoFlag::new(store, Duration::from_millis(80));
        assert!(flag.activate(0));

        let fired = Arc::new(AtomicUsize::new(0));
        let w = fired.clone();
        let e = fired.clone();
        let timers = DemoTimers::arm(
            &flag,
            0,
            Duration::from_millis(40),
            move || {
                w.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                e.fetch_add(1, Ordering::SeqCst);
            },
        );
        timers.cancel();

        sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cross_tab_activation_triggers_resync() {
        let hub = SignalHub::new();
        let raw: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let tab_a = DemoFlag::new(DefensiveStore::with_hub(raw.clone(), hub.clone()), TTL);
        let tab_b = DemoFlag::new(DefensiveStore::with_hub(raw, hub), TTL);

        let resyncs = Arc::new(AtomicUsize::new(0));
        let counter = resyncs.clone();
        let _sync = tab_b
            .subscribe_sync(Duration::from_millis(20), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(tab_a.activate(0));
        sleep(Duration::from_millis(120)).await;
        assert_eq!(resyncs.load(Ordering::SeqCst), 1);
        assert!(tab_b.is_live(0));
    }

    #[derive(Default)]
    struct EventOrder {
        events: std::sync::Mutex<Vec<&'static str>>,
    }

    impl EventOrder {
        fn push(&self, event: &'static str) {
            self.events.lock().unwrap().push(event);
        }

        fn snapshot(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }
}
