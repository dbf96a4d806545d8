//! ---
//! ctk_section: "04-event-delivery"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Durable at-least-once event delivery."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Durable, capped, at-least-once event delivery for the CTK workspace.
//!
//! Events are persisted to the defensive store on every queue mutation,
//! batched to the backend, and removed only after acknowledgement. A
//! single retry timer per engine applies exponential backoff between
//! flush attempts.

/// Result alias used throughout the delivery crate.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error type for the delivery subsystem.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// A call site handed over a structurally invalid event. This class
    /// is rejected loudly instead of silently dropped: it indicates a
    /// defect that degrades data quality.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper for transport failures.
    #[error("transport error: {0}")]
    Transport(#[from] transport::TransportError),
    /// Wrapper for Prometheus metrics registration failures.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub mod backoff;
pub mod engine;
pub mod event;
pub mod metrics;
pub mod queue;
pub mod transport;

pub use backoff::Backoff;
pub use engine::{DeliveryEngine, EngineHandle};
pub use event::{EventDraft, StoredEvent};
pub use metrics::DeliveryMetrics;
pub use queue::{DurableQueue, QUEUE_KEY};
pub use transport::{BatchAck, BatchTransport, HttpBatchTransport, TransportError};
