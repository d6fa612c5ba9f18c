//! Event message types.
//!
//! Events are unsolicited frames pushed by the gateway. They carry no
//! correlation id; listeners are selected by the session key found in the
//! payload (see [`crate::router`]).
//!
//! # Event Types
//!
//! | Event | Payload highlights |
//! |-------|--------------------|
//! | `connect.challenge` | `nonce`, `ts` (consumed by the handshake) |
//! | `chat` | `runId`, `sessionKey`, `state`, `message` |
//! | `agent` | `runId`, `sessionKey`, `stream`, `data` |
//! | `tick` | `ts` |
//! | `shutdown` | `reason`, `restartExpectedMs` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Constants
// ============================================================================

/// Name of the handshake challenge event.
pub const CONNECT_CHALLENGE: &str = "connect.challenge";

// ============================================================================
// Event
// ============================================================================

/// An event notification from gateway to client.
///
/// # Format
///
/// ```json
/// {
///   "type": "event",
///   "event": "chat",
///   "payload": { ... },
///   "seq": 42
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event name.
    pub event: String,

    /// Event-specific data.
    #[serde(default)]
    pub payload: Value,

    /// Gateway-wide sequence number, when the gateway assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,

    /// Opaque state version snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_version: Option<Value>,
}

impl Event {
    /// Creates an event with no sequence number.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            seq: None,
            state_version: None,
        }
    }

    /// Sets the sequence number.
    #[inline]
    #[must_use]
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Returns `true` for the handshake challenge.
    #[inline]
    #[must_use]
    pub fn is_challenge(&self) -> bool {
        self.event == CONNECT_CHALLENGE
    }

    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        match self.event.as_str() {
            CONNECT_CHALLENGE => ParsedEvent::Challenge {
                nonce: self.get_string("nonce"),
                ts: self.get_u64("ts"),
            },

            "chat" => ParsedEvent::Chat {
                run_id: self.get_string("runId"),
                session_key: self.get_string("sessionKey"),
                state: self.get_string("state"),
                message: self.payload.get("message").cloned(),
            },

            "agent" => ParsedEvent::Agent {
                run_id: self.get_string("runId"),
                stream: self.get_string("stream"),
                data: self.payload.get("data").cloned().unwrap_or(Value::Null),
            },

            "tick" => ParsedEvent::Tick {
                ts: self.get_u64("ts"),
            },

            "shutdown" => ParsedEvent::Shutdown {
                reason: self.get_string("reason"),
                restart_expected_ms: self.payload.get("restartExpectedMs").and_then(Value::as_u64),
            },

            _ => ParsedEvent::Unknown {
                event: self.event.clone(),
                payload: self.payload.clone(),
            },
        }
    }

    /// Gets a string from the payload.
    ///
    /// Returns empty string if key not found or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.payload
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a u64 from the payload.
    #[inline]
    fn get_u64(&self, key: &str) -> u64 {
        self.payload
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or_default()
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event types for type-safe handling.
///
/// Unknown events keep their raw payload so nothing is lost.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// Handshake challenge.
    Challenge {
        /// Single-use nonce to sign.
        nonce: String,
        /// Gateway timestamp in ms.
        ts: u64,
    },

    /// Chat stream update.
    Chat {
        /// Run the update belongs to.
        run_id: String,
        /// Session the run belongs to.
        session_key: String,
        /// `delta`, `final`, `aborted` or `error`.
        state: String,
        /// Message body, if any.
        message: Option<Value>,
    },

    /// Agent stream update.
    Agent {
        /// Run the update belongs to.
        run_id: String,
        /// Stream name (`assistant`, `tool`, `lifecycle`, ...).
        stream: String,
        /// Stream-specific data.
        data: Value,
    },

    /// Gateway heartbeat.
    Tick {
        /// Gateway timestamp in ms.
        ts: u64,
    },

    /// Gateway is going down.
    Shutdown {
        /// Reason given by the gateway.
        reason: String,
        /// Expected restart delay.
        restart_expected_ms: Option<u64>,
    },

    /// Unknown event type.
    Unknown {
        /// Event name.
        event: String,
        /// Raw payload.
        payload: Value,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_defaults() {
        let event: Event = serde_json::from_str(r#"{"event":"tick"}"#).expect("parse");
        assert_eq!(event.payload, Value::Null);
        assert_eq!(event.seq, None);
    }

    #[test]
    fn test_parse_challenge() {
        let event = Event::new(CONNECT_CHALLENGE, json!({"nonce": "n-1", "ts": 17}));
        assert!(event.is_challenge());
        assert_eq!(
            event.parse(),
            ParsedEvent::Challenge {
                nonce: "n-1".into(),
                ts: 17
            }
        );
    }

    #[test]
    fn test_parse_chat() {
        let event = Event::new(
            "chat",
            json!({"runId": "r1", "sessionKey": "abc", "state": "delta", "message": {"text": "hi"}}),
        );

        match event.parse() {
            ParsedEvent::Chat {
                run_id,
                session_key,
                state,
                message,
            } => {
                assert_eq!(run_id, "r1");
                assert_eq!(session_key, "abc");
                assert_eq!(state, "delta");
                assert_eq!(message, Some(json!({"text": "hi"})));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_shutdown() {
        let event = Event::new("shutdown", json!({"reason": "update", "restartExpectedMs": 1500}));
        assert_eq!(
            event.parse(),
            ParsedEvent::Shutdown {
                reason: "update".into(),
                restart_expected_ms: Some(1500)
            }
        );
    }

    #[test]
    fn test_parse_unknown_keeps_payload() {
        let event = Event::new("presence", json!({"x": 1}));
        assert_eq!(
            event.parse(),
            ParsedEvent::Unknown {
                event: "presence".into(),
                payload: json!({"x": 1})
            }
        );
    }
}
