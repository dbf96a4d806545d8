//! ---
//! ctk_section: "05-interaction-tracking"
//! ctk_subsection: "engagement grades"
//! ctk_type: "source"
//! ctk_scope: "tracker"
//! ctk_description: "Server-assigned engagement grade ladder with lenient parsing."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---

use serde::{Deserialize, Serialize};

/// Engagement grade assigned by the scoring backend.
///
/// Declaration order defines the rank: `F < C < B < A < S`. Trackers only
/// ever move up this ladder, never down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    /// No meaningful engagement.
    F,
    /// Baseline engagement.
    C,
    /// Solid engagement.
    B,
    /// Strong engagement.
    A,
    /// Top tier; triggers the one-shot escalation callback.
    S,
}

impl Grade {
    /// Parse a grade letter from an untrusted server payload.
    ///
    /// Anything that is not one of the five known letters maps to [`Grade::F`]
    /// rather than an error. The scoring backend has shipped surprising
    /// strings before and a bad grade must never break delivery handling.
    pub fn parse_lenient(raw: &str) -> Grade {
        match raw.trim() {
            "S" => Grade::S,
            "A" => Grade::A,
            "B" => Grade::B,
            "C" => Grade::C,
            "F" => Grade::F,
            other => {
                tracing::debug!(target: "ctk::tracker", raw = other, "unknown grade letter, treating as F");
                Grade::F
            }
        }
    }

    /// The canonical single-letter form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::S => "S",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::F => "F",
        }
    }

    /// Whether this is the top of the ladder.
    pub fn is_top(&self) -> bool {
        matches!(self, Grade::S)
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
