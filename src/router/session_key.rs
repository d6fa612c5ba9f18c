//! Best-effort session key extraction.
//!
//! Events do not carry a session key in a fixed place. A short, ordered
//! list of payload paths is probed; the first non-empty string wins. An
//! event that matches none is delivered to global listeners only.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::identifiers::SessionKey;

// ============================================================================
// Constants
// ============================================================================

/// Payload paths probed for a session key, in priority order.
pub const SESSION_KEY_PATHS: &[&[&str]] = &[
    &["sessionKey"],
    &["session_key"],
    &["data", "sessionKey"],
];

// ============================================================================
// Extraction
// ============================================================================

/// Returns the session key carried by an event payload, if any.
#[must_use]
pub fn extract_session_key(payload: &Value) -> Option<SessionKey> {
    SESSION_KEY_PATHS.iter().find_map(|path| {
        path.iter()
            .try_fold(payload, |value, segment| value.get(segment))
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
            .map(SessionKey::from)
    })
}

// ============================================================================
// Tests
// ============================================================================
