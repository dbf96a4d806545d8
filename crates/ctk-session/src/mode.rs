//! ---
//! ctk_section: "03-session-identity"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "TTL-bound tokens and page-mode resolution."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::demo::DemoFlag;

/// The three mutually exclusive product modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageMode {
    /// Unauthenticated, no live demo flag.
    Visitor,
    /// Unauthenticated with a live demo flag.
    Demo,
    /// Authenticated; takes precedence over any demo flag.
    Live,
}

impl PageMode {
    /// Pure resolution rule: `live` if authenticated, else `demo` if the
    /// flag is live, else `visitor`.
    pub fn resolve(is_authenticated: bool, demo_live: bool) -> Self {
        if is_authenticated {
            PageMode::Live
        } else if demo_live {
            PageMode::Demo
        } else {
            PageMode::Visitor
        }
    }

    /// Static label for logs and status payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            PageMode::Visitor => "visitor",
            PageMode::Demo => "demo",
            PageMode::Live => "live",
        }
    }
}

impl fmt::Display for PageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally supplied authentication signal consumed by the resolver.
pub trait AuthSignal: Send + Sync {
    /// Whether the surrounding application considers the user signed in.
    fn is_authenticated(&self) -> bool;
}

impl<F> AuthSignal for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_authenticated(&self) -> bool {
        self()
    }
}

/// Combines the auth signal with the demo flag. No caching of its own:
/// the mode is cheap to recompute and is recomputed on every call.
#[derive(Clone)]
pub struct ModeResolver {
    auth: Arc<dyn AuthSignal>,
    demo: DemoFlag,
}

impl ModeResolver {
    /// Couple an auth signal with a demo flag.
    pub fn new(auth: Arc<dyn AuthSignal>, demo: DemoFlag) -> Self {
        Self { auth, demo }
    }

    /// Resolve the mode at `now_ms`.
    pub fn current(&self, now_ms: i64) -> PageMode {
        PageMode::resolve(self.auth.is_authenticated(), self.demo.is_live(now_ms))
    }

    /// Whether the current mode is demo.
    pub fn is_demo(&self, now_ms: i64) -> bool {
        self.current(now_ms) == PageMode::Demo
    }

    /// Whether the current mode is live.
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.current(now_ms) == PageMode::Live
    }

    /// Whether the current mode is visitor.
    pub fn is_visitor(&self, now_ms: i64) -> bool {
        self.current(now_ms) == PageMode::Visitor
    }

    /// The demo flag this resolver reads.
    pub fn demo(&self) -> &DemoFlag {
        &self.demo
    }
}

impl std::fmt::Debug for ModeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeResolver").finish_non_exhaustive()
    }
}
