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
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

const HUB_CAPACITY: usize = 64;

/// Signals observed by cross-tab subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageSignal {
    /// A key in the shared store was written or removed.
    Mutation {
        /// The mutated key.
        key: String,
    },
    /// The page returned to the foreground. Covers platforms where the
    /// mutation channel does not fire reliably (e.g. wake from background),
    /// so it matches every subscription regardless of key filter.
    VisibilityRestored,
}

/// Broadcast channel carrying [`StorageSignal`]s between holders of the
/// same underlying store.
#[derive(Clone)]
pub struct SignalHub {
    tx: broadcast::Sender<StorageSignal>,
}

impl SignalHub {
    /// Create a hub with the default buffer capacity.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    /// Publish a key mutation. Receivers that have lagged off the end of
    /// the buffer resynchronise instead of observing every signal.
    pub fn publish_mutation(&self, key: &str) {
        let _ = self.tx.send(StorageSignal::Mutation {
            key: key.to_owned(),
        });
    }

    /// Publish the visibility-restored signal.
    pub fn notify_visible(&self) {
        let _ = self.tx.send(StorageSignal::VisibilityRestored);
    }

    /// Open a new subscription to the raw signal stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageSignal> {
        self.tx.subscribe()
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHub")
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

/// Debounce phases. The machine is either waiting for a first matching
/// signal or holding a pending deadline that later signals push forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebouncePhase {
    Idle,
    Pending(Instant),
}

/// Debounced resync subscription.
///
/// Subscribes to a [`SignalHub`], filters mutations to one key
/// (visibility signals always match), and coalesces bursts within the
/// configured window into a single callback invocation. Modelled as an
/// explicit idle/pending state machine with an explicit [`cancel`]
/// operation rather than a closure-captured timer handle.
///
/// [`cancel`]: DebouncedSync::cancel
pub struct DebouncedSync {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DebouncedSync {
    /// Spawn a subscription on `hub` watching `key`, invoking `on_resync`
    /// at most once per quiet `window`.
    pub fn spawn<F>(hub: &SignalHub, key: impl Into<String>, window: Duration, on_resync: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let key = key.into();
        let mut rx = hub.subscribe();
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let on_resync = Arc::new(on_resync);

        let task = tokio::spawn(async move {
            let mut phase = DebouncePhase::Idle;
            loop {
                let deadline = match phase {
                    DebouncePhase::Pending(at) => Some(at),
                    DebouncePhase::Idle => None,
                };
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    signal = rx.recv() => match signal {
                        Ok(StorageSignal::Mutation { key: mutated }) if mutated == key => {
                            phase = DebouncePhase::Pending(Instant::now() + window);
                        }
                        Ok(StorageSignal::VisibilityRestored) => {
                            phase = DebouncePhase::Pending(Instant::now() + window);
                        }
                        Ok(StorageSignal::Mutation { .. }) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Missed signals may have included ours; resync.
                            debug!(target: "ctk::storage::sync", key = %key, skipped, "subscription lagged");
                            phase = DebouncePhase::Pending(Instant::now() + window);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        phase = DebouncePhase::Idle;
                        on_resync();
                    }
                }
            }
        });

        Self { shutdown, task }
    }

    /// Cancel the subscription. Pending (not yet fired) resyncs are
    /// dropped; the background task stops without invoking the callback
    /// against a torn-down context.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for DebouncedSync {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
    }
}
