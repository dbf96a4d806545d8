//! ---
//! ctk_section: "04-event-delivery"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Durable at-least-once event delivery."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use std::time::Duration;

/// Exponential retry backoff with a server-override slot.
///
/// Starts at the floor, at least doubles on each failure up to the
/// ceiling, and resets to the floor on any success. When the server
/// suggests an explicit retry interval it is used verbatim for the next
/// tick instead of the computed value.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
    override_next: Option<Duration>,
}

impl Backoff {
    /// Construct a backoff over `[floor, ceiling]`.
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
            current: floor,
            override_next: None,
        }
    }

    /// Delay before the next tick, consuming any pending server override.
    pub fn next_delay(&mut self) -> Duration {
        match self.override_next.take() {
            Some(suggested) => suggested,
            None => self.current,
        }
    }

    /// The current computed interval (ignoring any pending override).
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Double the interval, capped at the ceiling.
    pub fn on_failure(&mut self) {
        self.current = (self.current * 2).min(self.ceiling);
    }

    /// Reset to the floor.
    pub fn on_success(&mut self) {
        self.current = self.floor;
    }

    /// Use `suggested` verbatim for the next tick.
    pub fn override_next(&mut self, suggested: Duration) {
        self.override_next = Some(suggested);
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(300))
    }
}
