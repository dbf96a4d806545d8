//! ---
//! ctk_section: "05-interaction-tracking"
//! ctk_subsection: "crate root"
//! ctk_type: "source"
//! ctk_scope: "tracker"
//! ctk_description: "Per-page-visit interaction tracking: dedup latches, grade escalation, dual transports."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
//!
//! One [`InteractionTracker`] lives for the duration of a single tracked page
//! visit. It counts user actions, deduplicates one-shot signals with latches,
//! delivers them over an ordered transport cascade, and adopts server-assigned
//! engagement grades monotonically.

pub mod fingerprint;
pub mod grade;
pub mod tracker;
pub mod transport;

pub use fingerprint::DeviceFingerprint;
pub use grade::Grade;
pub use tracker::{ActionCounters, InteractionKind, InteractionOutcome, InteractionTracker, TrackerContext};
pub use transport::{
    BeaconTransport, HttpInteractionTransport, InteractionPayload, InteractionTransport, TrackAck,
    TransportCascade,
};
