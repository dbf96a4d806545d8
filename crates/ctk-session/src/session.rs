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

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, warn};

use ctk_storage::{DebouncedSync, DefensiveStore};

use crate::ttl::{write_verified, TtlPolicy};

/// Storage key holding the anonymous session token string.
pub const SESSION_KEY: &str = "ctk.session";
/// Companion key holding the token's created-at marker (raw ms, decimal).
pub const SESSION_CREATED_AT_KEY: &str = "ctk.session.created_at";

const TOKEN_PREFIX: &str = "u_";
const TOKEN_RANDOM_LEN: usize = 9;

/// The anonymous session token: identifies an unauthenticated actor
/// across a seven-day window (configurable).
///
/// Fail-closed rule: a missing or unparsable created-at marker reports
/// the token as expired even when the token string itself is present;
/// pre-marker clients must not carry indefinitely valid tokens.
#[derive(Debug, Clone)]
pub struct AnonSession {
    store: DefensiveStore,
    policy: TtlPolicy,
}

impl AnonSession {
    /// Bind the session to a store with the given lifetime.
    pub fn new(store: DefensiveStore, ttl: Duration) -> Self {
        Self {
            store,
            policy: TtlPolicy::new(ttl),
        }
    }

    /// Bind the session using the workspace session configuration.
    pub fn from_config(store: DefensiveStore, config: &ctk_common::SessionConfig) -> Self {
        Self::new(store, config.session_ttl)
    }

    /// Read the created-at marker. A marker that fails to parse is
    /// deleted before returning `None`.
    pub fn created_at(&self) -> Option<i64> {
        let raw = self.store.get(SESSION_CREATED_AT_KEY)?;
        match raw.trim().parse::<i64>() {
            Ok(ms) => Some(ms),
            Err(err) => {
                warn!(target: "ctk::session::anon", error = %err, "corrupt created-at marker removed");
                self.store.remove(SESSION_CREATED_AT_KEY);
                None
            }
        }
    }

    /// Whether a stored token is live at `now_ms`. Absent marker ⇒ `false`.
    pub fn is_live(&self, now_ms: i64) -> bool {
        match self.created_at() {
            Some(created) => self.policy.is_live(created, now_ms),
            None => false,
        }
    }

    /// Remaining token lifetime at `now_ms`; zero when expired, absent,
    /// or the marker is unreadable.
    pub fn remaining(&self, now_ms: i64) -> Duration {
        match self.created_at() {
            Some(created) => self.policy.remaining(created, now_ms),
            None => Duration::ZERO,
        }
    }

    /// Return the live session token, minting and persisting a fresh one
    /// when none is usable.
    ///
    /// Re-affirming a live session preserves its created-at marker, so
    /// repeated visits do not reset the expiry clock. When the store
    /// cannot be verified (private browsing) the caller still receives a
    /// usable in-memory token; it simply will not survive the page.
    pub fn ensure(&self, now_ms: i64) -> String {
        if self.is_live(now_ms) {
            if let Some(token) = self.store.get(SESSION_KEY) {
                if token.starts_with(TOKEN_PREFIX) {
                    return token;
                }
                debug!(target: "ctk::session::anon", "malformed stored token discarded");
            }
        }

        let token = mint_token();
        let preserved = self
            .created_at()
            .filter(|created| self.policy.is_live(*created, now_ms));
        let created_at = preserved.unwrap_or(now_ms);

        let token_ok = write_verified(&self.store, SESSION_KEY, &token);
        let marker_ok =
            write_verified(&self.store, SESSION_CREATED_AT_KEY, &created_at.to_string());
        if !token_ok || !marker_ok {
            warn!(
                target: "ctk::session::anon",
                token_ok,
                marker_ok,
                "session persistence unverified; using in-memory token"
            );
        }
        token
    }

    /// Subscribe to cross-tab resync for the token key. Returns `None`
    /// when the store has no signal hub attached.
    pub fn subscribe_sync<F>(&self, window: Duration, on_resync: F) -> Option<DebouncedSync>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let hub = self.store.hub()?;
        Some(DebouncedSync::spawn(hub, SESSION_KEY, window, on_resync))
    }
}

fn mint_token() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_RANDOM_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("{TOKEN_PREFIX}{random}")
}
