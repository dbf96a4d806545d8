//! ---
//! ctk_section: "04-event-delivery"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Durable at-least-once event delivery."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::error;
use uuid::Uuid;

use crate::{DeliveryError, Result};

/// Caller-supplied event fields, validated at the engine boundary.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    /// Event name (e.g. `click_line`).
    pub event: String,
    /// Page identifier the event originated from.
    pub page: String,
    /// Optional DOM-ish target identifier.
    pub target_id: Option<String>,
    /// Authenticated user id, when known.
    pub user_id: Option<String>,
    /// Free-form structured context.
    pub meta: Map<String, Value>,
}

impl EventDraft {
    /// Start a draft from the two mandatory fields.
    pub fn new(event: impl Into<String>, page: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            page: page.into(),
            ..Self::default()
        }
    }

    /// Attach a target identifier.
    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Attach an authenticated user id.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach one meta entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }
}

/// A persisted telemetry event. The `request_id` is the idempotency key:
/// generated exactly once here and never regenerated, so the backend can
/// discard redeliveries after a retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    /// Event name.
    pub event: String,
    /// Originating page.
    pub page: String,
    /// Optional target identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Session this event belongs to.
    pub session_id: String,
    /// Authenticated user id, or `null` for anonymous traffic.
    pub user_id: Option<String>,
    /// Wall-clock creation time.
    pub timestamp: DateTime<Utc>,
    /// Free-form structured context.
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// Idempotency key, stable across retries.
    pub request_id: Uuid,
}

impl StoredEvent {
    /// Validate a draft and stamp it into a stored event.
    ///
    /// Empty `event` or `page` is a call-site defect, rejected with a
    /// loud developer-facing error rather than silently dropped.
    pub fn from_draft(draft: EventDraft, session_id: &str, now: DateTime<Utc>) -> Result<Self> {
        if draft.event.trim().is_empty() {
            error!(target: "ctk::delivery", "rejected event draft with empty event name; fix the call site");
            return Err(DeliveryError::InvalidEvent("empty event name".into()));
        }
        if draft.page.trim().is_empty() {
            error!(target: "ctk::delivery", event = %draft.event, "rejected event draft with empty page; fix the call site");
            return Err(DeliveryError::InvalidEvent("empty page".into()));
        }
        Ok(Self {
            event: draft.event,
            page: draft.page,
            target_id: draft.target_id,
            session_id: session_id.to_owned(),
            user_id: draft.user_id,
            timestamp: now,
            meta: draft.meta,
            request_id: Uuid::new_v4(),
        })
    }
}
