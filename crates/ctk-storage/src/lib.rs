//! ---
//! ctk_section: "02-defensive-storage"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Defensive storage capability and mutation signalling."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Defensive storage capability for the CTK workspace.
//!
//! Every other crate reaches persistent client state exclusively through
//! [`DefensiveStore`]; the raw [`KeyValueStore`] primitive is never handed
//! out directly. Mutations are published on a [`SignalHub`] so that other
//! consumers of the same underlying store (other tabs, in browser terms)
//! can resynchronise through a [`DebouncedSync`] subscription.

/// Result alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Error type for the storage subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Wrapper for IO errors from the file-backed store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Raised when the underlying store refuses service (quota, policy).
    #[error("store unavailable: {0}")]
    Unavailable(&'static str),
}

pub mod defensive;
pub mod store;
pub mod sync;

pub use defensive::DefensiveStore;
pub use store::{FaultMode, FaultyStore, FileStore, KeyValueStore, MemoryStore};
pub use sync::{DebouncedSync, SignalHub, StorageSignal};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_stable() {
        let err = StorageError::Unavailable("quota exceeded");
        assert_eq!(format!("{err}"), "store unavailable: quota exceeded");
    }
}
