//! Frame envelope and text codec.
//!
//! Every WebSocket text message carries exactly one self-describing frame,
//! discriminated by its `type` field. The codec is stateless.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;

use super::{Event, Request, Response};

// ============================================================================
// Frame
// ============================================================================

/// One discrete message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Method call (`"type": "req"`).
    #[serde(rename = "req")]
    Request(Request),

    /// Method result (`"type": "res"`).
    #[serde(rename = "res")]
    Response(Response),

    /// Server push (`"type": "event"`).
    #[serde(rename = "event")]
    Event(Event),
}

impl Frame {
    /// Returns the wire discriminator of this frame.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "req",
            Self::Response(_) => "res",
            Self::Event(_) => "event",
        }
    }
}

impl From<Request> for Frame {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for Frame {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<Event> for Frame {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

// ============================================================================
// ParseError
// ============================================================================

/// An inbound message that is not a valid frame.
///
/// Callers drop such messages; one bad push must not take down the socket.
#[derive(Debug, Error)]
#[error("Malformed frame: {source}")]
pub struct ParseError {
    #[from]
    source: serde_json::Error,
}

// ============================================================================
// Codec
// ============================================================================

/// Encodes a frame as a JSON text message.
///
/// # Errors
///
/// Returns [`crate::Error::Json`] if a payload cannot be serialized.
pub fn encode(frame: &Frame) -> Result<String> {
    Ok(serde_json::to_string(frame)?)
}

/// Decodes one text message into a frame.
///
/// # Errors
///
/// Returns [`ParseError`] for invalid JSON, an unknown `type`, or missing
/// required fields.
pub fn decode(text: &str) -> std::result::Result<Frame, ParseError> {
    Ok(serde_json::from_str(text)?)
}

// ============================================================================
// Tests
// ============================================================================
