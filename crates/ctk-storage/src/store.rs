//! ---
//! ctk_section: "02-defensive-storage"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Defensive storage capability and mutation signalling."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;

use crate::{Result, StorageError};

/// The raw client-scoped key/value primitive.
///
/// Implementations may fail or silently misbehave (restrictive browser
/// storage is the motivating case); only [`crate::DefensiveStore`] is
/// allowed to consume this trait directly.
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Remove the value stored under `key`; absent keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// File-backed store keeping one file per key under a root directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        // Keys are dotted identifiers ("ctk.demo"); anything outside a
        // conservative set is mapped to '_' so a key can never escape root.
        let sanitised: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{sanitised}.kv"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.entry_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::write(self.entry_path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory store used by embedding applications without a disk scope
/// and by unit tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Fault behaviours for [`FaultyStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultMode {
    /// Operate normally.
    Healthy = 0,
    /// Every operation errors (store inaccessible).
    FailAll = 1,
    /// Writes report success but persist nothing (private-browsing quota
    /// behaviour); reads and removes pass through.
    SilentDropWrites = 2,
}

/// Wrapper that injects storage faults on demand.
///
/// Models the hostile browser stores the defensive layer exists for; used
/// across the workspace's test suites.
pub struct FaultyStore<S> {
    inner: S,
    mode: AtomicU8,
}

impl<S: KeyValueStore> FaultyStore<S> {
    /// Wrap `inner`, starting healthy.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            mode: AtomicU8::new(FaultMode::Healthy as u8),
        }
    }

    /// Switch the injected fault behaviour.
    pub fn set_mode(&self, mode: FaultMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    fn mode(&self) -> FaultMode {
        match self.mode.load(Ordering::SeqCst) {
            1 => FaultMode::FailAll,
            2 => FaultMode::SilentDropWrites,
            _ => FaultMode::Healthy,
        }
    }
}

impl<S: KeyValueStore> KeyValueStore for FaultyStore<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.mode() {
            FaultMode::FailAll => Err(StorageError::Unavailable("injected fault")),
            _ => self.inner.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        match self.mode() {
            FaultMode::FailAll => Err(StorageError::Unavailable("injected fault")),
            FaultMode::SilentDropWrites => Ok(()),
            FaultMode::Healthy => self.inner.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.mode() {
            FaultMode::FailAll => Err(StorageError::Unavailable("injected fault")),
            _ => self.inner.remove(key),
        }
    }
}
