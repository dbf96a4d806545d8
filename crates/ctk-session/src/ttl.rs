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

use ctk_storage::DefensiveStore;

/// Lifetime policy shared by the TTL token instances.
///
/// A token is live iff `now - written_at < ttl`. All arithmetic is on
/// epoch milliseconds supplied by the caller, so expiry maths stays
/// deterministic under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    ttl: Duration,
}

impl TtlPolicy {
    /// Construct a policy with the given lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// The configured lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Remaining lifetime for a token written at `written_at_ms`:
    /// `max(0, ttl - (now - written_at))`. A written-at in the future
    /// (cross-device clock skew) is treated as freshly written.
    pub fn remaining(&self, written_at_ms: i64, now_ms: i64) -> Duration {
        if now_ms <= written_at_ms {
            return self.ttl;
        }
        let elapsed = Duration::from_millis((now_ms - written_at_ms) as u64);
        self.ttl.saturating_sub(elapsed)
    }

    /// Whether the token is still live.
    pub fn is_live(&self, written_at_ms: i64, now_ms: i64) -> bool {
        !self.remaining(written_at_ms, now_ms).is_zero()
    }
}

/// Write `value` under `key` and immediately read it back.
///
/// Returns `true` only when the read-back matches exactly. Restrictive
/// browser storage (private-mode quotas) accepts writes without
/// persisting them; the read-back is the only reliable detection.
pub fn write_verified(store: &DefensiveStore, key: &str, value: &str) -> bool {
    if store.try_set(key, value).is_err() {
        return false;
    }
    store.get(key).as_deref() == Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctk_storage::{FaultMode, FaultyStore, MemoryStore};
    use std::sync::Arc;

    const HOUR_MS: i64 = 3_600_000;

    #[test]
    fn remaining_counts_down_and_clamps_at_zero() {
        let policy = TtlPolicy::new(Duration::from_secs(7200));
        assert_eq!(policy.remaining(0, 0), Duration::from_secs(7200));
        assert_eq!(policy.remaining(0, HOUR_MS), Duration::from_secs(3600));
        assert_eq!(policy.remaining(0, 2 * HOUR_MS), Duration::ZERO);
        assert_eq!(policy.remaining(0, 3 * HOUR_MS), Duration::ZERO);
    }

    #[test]
    fn live_window_is_half_open() {
        let policy = TtlPolicy::new(Duration::from_secs(7200));
        assert!(policy.is_live(0, 0));
        assert!(policy.is_live(0, 2 * HOUR_MS - 1));
        assert!(!policy.is_live(0, 2 * HOUR_MS));
    }

    #[test]
    fn future_written_at_reads_as_fresh() {
        let policy = TtlPolicy::new(Duration::from_secs(60));
        assert_eq!(policy.remaining(10_000, 0), Duration::from_secs(60));
    }

    #[test]
    fn write_verified_detects_silent_drop() {
        let raw = Arc::new(FaultyStore::new(MemoryStore::new()));
        let store = DefensiveStore::new(raw.clone());

        assert!(write_verified(&store, "key", "value"));

        raw.set_mode(FaultMode::SilentDropWrites);
        assert!(!write_verified(&store, "key2", "value"));

        raw.set_mode(FaultMode::FailAll);
        assert!(!write_verified(&store, "key3", "value"));
    }
}
