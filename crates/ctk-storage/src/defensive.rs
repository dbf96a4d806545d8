//! ---
//! ctk_section: "02-defensive-storage"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Defensive storage capability and mutation signalling."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use std::sync::Arc;

use tracing::warn;

use crate::store::KeyValueStore;
use crate::sync::SignalHub;
use crate::Result;

/// Fault-tolerant facade over the raw storage primitive.
///
/// The defaulting accessors ([`get`](Self::get), [`set`](Self::set),
/// [`remove`](Self::remove)) never propagate an error: any underlying
/// fault is logged and degraded to `None` / no-op. The `try_*` variants
/// exist so callers can distinguish "value absent" from "store unusable"
/// when they need to; the defaulting accessors are built on top of them.
///
/// Successful mutations are published on the attached [`SignalHub`] so
/// other holders of the same underlying store observe them.
#[derive(Clone)]
pub struct DefensiveStore {
    inner: Arc<dyn KeyValueStore>,
    hub: Option<SignalHub>,
}

impl DefensiveStore {
    /// Wrap a raw store without mutation signalling.
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner, hub: None }
    }

    /// Wrap a raw store, publishing mutations on `hub`.
    pub fn with_hub(inner: Arc<dyn KeyValueStore>, hub: SignalHub) -> Self {
        Self {
            inner,
            hub: Some(hub),
        }
    }

    /// The hub mutations are published on, if any.
    pub fn hub(&self) -> Option<&SignalHub> {
        self.hub.as_ref()
    }

    /// Fallible read.
    pub fn try_get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    /// Fallible write; publishes a mutation signal on success.
    pub fn try_set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(key, value)?;
        if let Some(hub) = &self.hub {
            hub.publish_mutation(key);
        }
        Ok(())
    }

    /// Fallible removal; publishes a mutation signal on success.
    pub fn try_remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)?;
        if let Some(hub) = &self.hub {
            hub.publish_mutation(key);
        }
        Ok(())
    }

    /// Read `key`, degrading any storage fault to `None`.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "ctk::storage", key, error = %err, "read degraded to absent");
                None
            }
        }
    }

    /// Write `key`, degrading any storage fault to a no-op.
    pub fn set(&self, key: &str, value: &str) {
        if let Err(err) = self.try_set(key, value) {
            warn!(target: "ctk::storage", key, error = %err, "write dropped");
        }
    }

    /// Remove `key`, degrading any storage fault to a no-op.
    pub fn remove(&self, key: &str) {
        if let Err(err) = self.try_remove(key) {
            warn!(target: "ctk::storage", key, error = %err, "removal dropped");
        }
    }
}

impl std::fmt::Debug for DefensiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefensiveStore")
            .field("hub", &self.hub.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FaultMode, FaultyStore, MemoryStore};
    use crate::sync::StorageSignal;

    #[test]
    fn degrades_faults_to_absent_and_noop() {
        let raw = Arc::new(FaultyStore::new(MemoryStore::new()));
        let store = DefensiveStore::new(raw.clone());

        raw.set_mode(FaultMode::FailAll);
        store.set("key", "value");
        assert_eq!(store.get("key"), None);
        store.remove("key");

        raw.set_mode(FaultMode::Healthy);
        store.set("key", "value");
        assert_eq!(store.get("key").as_deref(), Some("value"));
    }

    #[test]
    fn try_variants_expose_the_fault() {
        let raw = Arc::new(FaultyStore::new(MemoryStore::new()));
        raw.set_mode(FaultMode::FailAll);
        let store = DefensiveStore::new(raw);
        assert!(store.try_get("key").is_err());
        assert!(store.try_set("key", "value").is_err());
        assert!(store.try_remove("key").is_err());
    }

    #[tokio::test]
    async fn successful_mutations_are_published() {
        let hub = SignalHub::new();
        let mut rx = hub.subscribe();
        let store = DefensiveStore::with_hub(Arc::new(MemoryStore::new()), hub);

        store.set("ctk.demo", "{\"t\":1}");
        match rx.recv().await.unwrap() {
            StorageSignal::Mutation { key } => assert_eq!(key, "ctk.demo"),
            other => panic!("unexpected signal: {other:?}"),
        }

        store.remove("ctk.demo");
        match rx.recv().await.unwrap() {
            StorageSignal::Mutation { key } => assert_eq!(key, "ctk.demo"),
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[test]
    fn failed_mutations_are_not_published() {
        let hub = SignalHub::new();
        let mut rx = hub.subscribe();
        let raw = Arc::new(FaultyStore::new(MemoryStore::new()));
        raw.set_mode(FaultMode::FailAll);
        let store = DefensiveStore::with_hub(raw, hub);

        store.set("key", "value");
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }
}
