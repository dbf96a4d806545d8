//! ---
//! ctk_section: "03-session-identity"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "TTL-bound tokens and page-mode resolution."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
//! Time-bounded client identity and mode flags.
//!
//! Two instances of the same TTL-bound token pattern live here: the demo
//! flag (2 h) gating the temporary demo product mode, and the anonymous
//! session token (7 d) identifying an unauthenticated actor. The mode
//! resolver combines the externally supplied authentication signal with
//! the demo flag into exactly one of three page modes.

pub mod demo;
pub mod mode;
pub mod session;
pub mod ttl;

pub use demo::{DemoFlag, DemoTimers, DEMO_KEY};
pub use mode::{AuthSignal, ModeResolver, PageMode};
pub use session::{AnonSession, SESSION_CREATED_AT_KEY, SESSION_KEY};
pub use ttl::TtlPolicy;
