//! ---
//! ctk_section: "01-core-functionality"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Shared primitives and utilities for the telemetry core."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use chrono::{DateTime, TimeZone, Utc};

/// Current wall-clock time as epoch milliseconds.
///
/// Token lifetimes are compared against this value; callers that need a
/// deterministic clock (tests, expiry maths) pass an explicit `now_ms`
/// instead of calling this directly.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert epoch milliseconds back into a UTC timestamp, if representable.
pub fn ms_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
