//! ---
//! ctk_section: "04-event-delivery"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Durable at-least-once event delivery."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::event::StoredEvent;

/// Transport-level failures. Network faults on the batch path are always
/// retried with backoff; the queue stays untouched.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection, TLS, or timeout failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend answered outside the 2xx range.
    #[error("unexpected status: {0}")]
    Status(u16),
}

/// Acknowledgement for a delivered batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchAck {
    /// Server-suggested retry interval, used verbatim for the next tick.
    pub retry_after: Option<Duration>,
}

/// Seam between the delivery engine and the batch telemetry endpoint.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Deliver the batch; `Ok` means the backend acknowledged every event
    /// in it.
    async fn send_batch(&self, events: &[StoredEvent]) -> Result<BatchAck, TransportError>;
}

/// Success body of the batch endpoint; all fields optional.
#[derive(Debug, Deserialize, Default)]
struct BatchResponseBody {
    retry_after_ms: Option<u64>,
}

/// HTTP implementation posting the batch as one JSON array.
#[derive(Debug, Clone)]
pub struct HttpBatchTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBatchTransport {
    /// Build a transport for the given endpoint URL.
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl BatchTransport for HttpBatchTransport {
    async fn send_batch(&self, events: &[StoredEvent]) -> Result<BatchAck, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(events)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        // A malformed success body is not a delivery failure; it only
        // withholds the retry hint.
        let body = response
            .json::<BatchResponseBody>()
            .await
            .unwrap_or_default();
        if let Some(ms) = body.retry_after_ms {
            debug!(target: "ctk::delivery::transport", retry_after_ms = ms, "server suggested retry interval");
        }
        Ok(BatchAck {
            retry_after: body.retry_after_ms.map(Duration::from_millis),
        })
    }
}
