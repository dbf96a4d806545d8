//! ---
//! ctk_section: "05-interaction-tracking"
//! ctk_subsection: "device fingerprint"
//! ctk_type: "source"
//! ctk_scope: "tracker"
//! ctk_description: "Coarse device fingerprint, encoded as base64 JSON for the wire."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

/// Coarse, non-identifying device descriptor attached to every interaction
/// payload. Deliberately limited to three fields so it cannot serve as a
/// stable cross-session identifier.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceFingerprint {
    /// Display geometry, e.g. `"1920x1080"`.
    pub screen: String,
    /// IANA timezone name.
    pub timezone: String,
    /// BCP 47 language tag.
    pub language: String,
}

impl DeviceFingerprint {
    pub fn new(
        screen: impl Into<String>,
        timezone: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            screen: screen.into(),
            timezone: timezone.into(),
            language: language.into(),
        }
    }

    /// Placeholder when the host environment exposes nothing usable.
    pub fn unknown() -> Self {
        Self::new("unknown", "unknown", "unknown")
    }

    /// Base64 of the JSON form, which is what goes on the wire.
    pub fn encode(&self) -> String {
        // Serialization of three owned strings cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        STANDARD.encode(json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_base64_of_json() {
        let fp = DeviceFingerprint::new("1280x720", "Europe/Berlin", "de-DE");
        let decoded = STANDARD.decode(fp.encode()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(value["screen"], "1280x720");
        assert_eq!(value["timezone"], "Europe/Berlin");
        assert_eq!(value["language"], "de-DE");
    }
}
