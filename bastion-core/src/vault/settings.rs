//! User preference codec.
//!
//! Settings are persisted as an encrypted JSON blob; this module only deals
//! with the JSON. Parsing is tolerant by design: preferences are never worth
//! failing an unlock over, so malformed input falls back to defaults,
//! unknown or wrong-typed fields are ignored, and out-of-range numbers are
//! clamped instead of rejected.

use serde::Serialize;
use serde_json::Value;

/// Auto-lock bounds in minutes.
const AUTO_LOCK_RANGE: (i64, i64) = (1, 60);

/// Clipboard-clear bounds in seconds.
const CLIPBOARD_CLEAR_RANGE: (i64, i64) = (10, 120);

/// User preferences stored inside the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VaultSettings {
    /// Minutes of inactivity before the host locks the vault (1-60).
    pub auto_lock_minutes: u32,
    /// Whether the host clears the clipboard after copying a secret.
    pub clipboard_clear_enabled: bool,
    /// Seconds before the clipboard is cleared (10-120).
    pub clipboard_clear_seconds: u32,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            auto_lock_minutes: 5,
            clipboard_clear_enabled: true,
            clipboard_clear_seconds: 30,
        }
    }
}

impl VaultSettings {
    /// Serializes to JSON. Deterministic: field order is fixed by the struct.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("settings struct always serializes")
    }

    /// Parses settings JSON, tolerating anything.
    ///
    /// Non-object or malformed input yields the defaults. Fields that are
    /// absent or of the wrong type keep their defaults; integer fields are
    /// clamped to their documented ranges.
    #[must_use]
    pub fn from_json(json: &str) -> Self {
        let mut settings = Self::default();
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(json) else {
            return settings;
        };

        if let Some(minutes) = map.get("auto_lock_minutes").and_then(Value::as_i64) {
            settings.auto_lock_minutes =
                minutes.clamp(AUTO_LOCK_RANGE.0, AUTO_LOCK_RANGE.1) as u32;
        }
        if let Some(enabled) = map.get("clipboard_clear_enabled").and_then(Value::as_bool) {
            settings.clipboard_clear_enabled = enabled;
        }
        if let Some(seconds) = map.get("clipboard_clear_seconds").and_then(Value::as_i64) {
            settings.clipboard_clear_seconds =
                seconds.clamp(CLIPBOARD_CLEAR_RANGE.0, CLIPBOARD_CLEAR_RANGE.1) as u32;
        }
        settings
    }
}
