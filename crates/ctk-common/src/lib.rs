//! ---
//! ctk_section: "01-core-functionality"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Shared primitives and utilities for the telemetry core."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
//! Core shared primitives for the CTK workspace.
//! This crate exposes configuration loading, logging, and time utilities
//! consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{CoreConfig, DeliveryConfig, LoggingConfig, SessionConfig, StorageConfig};
pub use logging::{init_tracing, LogFormat};
pub use time::{ms_to_datetime, now_ms};
