//! ---
//! ctk_section: "04-event-delivery"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Durable at-least-once event delivery."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};
use uuid::Uuid;

use ctk_storage::DefensiveStore;

use crate::event::StoredEvent;

/// Storage key holding the persisted queue as a JSON array.
pub const QUEUE_KEY: &str = "ctk.queue";

/// Insertion-ordered event queue, persisted after every mutation.
///
/// There is no eventual-consistency window between the in-memory queue
/// and its persisted copy: each mutation rewrites the stored array before
/// returning, so a crash or navigation loses at most an in-flight network
/// call, never queued data.
#[derive(Debug)]
pub struct DurableQueue {
    store: DefensiveStore,
    cap: usize,
    entries: VecDeque<StoredEvent>,
}

impl DurableQueue {
    /// Load the persisted queue. Corrupted persisted state degrades to an
    /// empty queue; the corrupt entry is removed so the cost is paid once.
    pub fn load(store: DefensiveStore, cap: usize) -> Self {
        let entries = match store.get(QUEUE_KEY) {
            Some(raw) => match serde_json::from_str::<Vec<StoredEvent>>(&raw) {
                Ok(events) => {
                    if !events.is_empty() {
                        debug!(target: "ctk::delivery::queue", restored = events.len(), "restored persisted queue");
                    }
                    VecDeque::from(events)
                }
                Err(err) => {
                    warn!(target: "ctk::delivery::queue", error = %err, "corrupt persisted queue discarded");
                    store.remove(QUEUE_KEY);
                    VecDeque::new()
                }
            },
            None => VecDeque::new(),
        };
        Self {
            store,
            cap,
            entries,
        }
    }

    /// Append an event, dropping from the front once the cap is exceeded.
    /// Returns the number of events dropped to make room.
    pub fn push(&mut self, event: StoredEvent) -> usize {
        self.entries.push_back(event);
        let mut dropped = 0;
        while self.entries.len() > self.cap {
            self.entries.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            warn!(target: "ctk::delivery::queue", dropped, cap = self.cap, "queue cap exceeded; oldest events dropped");
        }
        self.persist();
        dropped
    }

    /// Remove exactly the events whose request id appears in `ids`.
    /// Events enqueued after the snapshot was taken are untouched.
    pub fn remove_ids(&mut self, ids: &HashSet<Uuid>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|event| !ids.contains(&event.request_id));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.persist();
        }
        removed
    }

    /// Clone the current contents in insertion order.
    pub fn snapshot(&self) -> Vec<StoredEvent> {
        self.entries.iter().cloned().collect()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) {
        match serde_json::to_string(&self.snapshot()) {
            Ok(raw) => self.store.set(QUEUE_KEY, &raw),
            Err(err) => {
                warn!(target: "ctk::delivery::queue", error = %err, "queue serialisation failed; persisted copy is stale")
            }
        }
    }
}
