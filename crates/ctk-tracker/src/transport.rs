//! ---
//! ctk_section: "05-interaction-tracking"
//! ctk_subsection: "interaction transports"
//! ctk_type: "source"
//! ctk_scope: "tracker"
//! ctk_description: "Response-aware and unload-safe interaction transports behind one cascade interface."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use ctk_delivery::TransportError;

use crate::tracker::ActionCounters;

/// Acknowledgement from the interaction endpoint. Only response-aware
/// transports can produce one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackAck {
    /// Whether the backend accepted and scored the interaction.
    #[serde(default)]
    pub success: bool,
    /// Engagement grade letter, when the backend chose to assign one.
    #[serde(default)]
    pub grade: Option<String>,
    /// Human-readable scoring note, surfaced through the escalation callback.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Wire envelope for a single interaction report.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionPayload {
    pub session_id: String,
    pub agent_id: Option<String>,
    /// Base64 JSON from [`crate::DeviceFingerprint::encode`].
    pub fingerprint: String,
    pub event: InteractionEvent,
}

/// The event half of [`InteractionPayload`].
#[derive(Debug, Clone, Serialize)]
pub struct InteractionEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub property_id: String,
    pub district: String,
    pub duration_seconds: u64,
    pub actions: ActionCounters,
    /// Reserved for focus-time buckets; always empty for now.
    pub focus: Vec<serde_json::Value>,
}

/// One way of getting an interaction payload to the backend.
///
/// Transports that cannot observe the server response (fire-and-forget)
/// return `Ok(None)`; response-aware transports return `Ok(Some(ack))`.
#[async_trait]
pub trait InteractionTransport: Send + Sync {
    /// Whether this transport can surface a [`TrackAck`].
    fn response_aware(&self) -> bool;

    /// Attempt delivery of one payload.
    async fn attempt(&self, payload: &InteractionPayload) -> Result<Option<TrackAck>, TransportError>;
}

/// Unload-safe transport: hands the payload off to a background task and
/// reports success immediately. The spawned send outlives the caller, so it
/// still goes out when the tracker is being torn down.
pub struct BeaconTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl BeaconTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl InteractionTransport for BeaconTransport {
    fn response_aware(&self) -> bool {
        false
    }

    async fn attempt(&self, payload: &InteractionPayload) -> Result<Option<TrackAck>, TransportError> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let body = payload.clone();
        tokio::spawn(async move {
            if let Err(err) = client.post(&endpoint).json(&body).send().await {
                debug!(target: "ctk::tracker", error = %err, "beacon send failed");
            }
        });
        Ok(None)
    }
}

/// Response-aware transport over a plain HTTP POST.
pub struct HttpInteractionTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpInteractionTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl InteractionTransport for HttpInteractionTransport {
    fn response_aware(&self) -> bool {
        true
    }

    async fn attempt(&self, payload: &InteractionPayload) -> Result<Option<TrackAck>, TransportError> {
        let response = self.client.post(&self.endpoint).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        // A delivered payload with an unreadable body is still delivered;
        // we just learn nothing about the grade.
        match response.json::<TrackAck>().await {
            Ok(ack) => Ok(Some(ack)),
            Err(err) => {
                warn!(target: "ctk::tracker", error = %err, "interaction ack unparseable, treating as accepted without grade");
                Ok(Some(TrackAck {
                    success: true,
                    grade: None,
                    reason: None,
                }))
            }
        }
    }
}

/// Outcome of running a payload through the cascade.
#[derive(Debug, Clone, Default)]
pub struct CascadeOutcome {
    /// Some transport accepted the payload.
    pub delivered: bool,
    /// A transport earlier in the order had to be skipped over.
    pub degraded: bool,
    /// Ack from a response-aware transport, when one produced it.
    pub ack: Option<TrackAck>,
}

/// Ordered list of transports, tried front to back until one accepts.
#[derive(Clone)]
pub struct TransportCascade {
    ordered: Vec<Arc<dyn InteractionTransport>>,
}

impl TransportCascade {
    /// Build a cascade. Callers list response-aware transports first and an
    /// unload-safe one last.
    pub fn new(ordered: Vec<Arc<dyn InteractionTransport>>) -> Self {
        Self { ordered }
    }

    /// The first transport that is safe to use during teardown, if any.
    pub fn unload_safe(&self) -> Option<&Arc<dyn InteractionTransport>> {
        self.ordered.iter().find(|t| !t.response_aware())
    }

    /// Run the payload through the cascade in order.
    pub async fn attempt(&self, payload: &InteractionPayload) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();
        for transport in &self.ordered {
            match transport.attempt(payload).await {
                Ok(ack) => {
                    outcome.delivered = true;
                    outcome.ack = ack;
                    return outcome;
                }
                Err(err) => {
                    warn!(
                        target: "ctk::tracker",
                        error = %err,
                        kind = %payload.event.kind,
                        "interaction transport failed, falling back"
                    );
                    outcome.degraded = true;
                }
            }
        }
        if !self.ordered.is_empty() {
            warn!(
                target: "ctk::tracker",
                kind = %payload.event.kind,
                "all interaction transports exhausted, report lost"
            );
        }
        outcome
    }
}
