//! Request and Response message types.
//!
//! Defines the frames exchanged for correlated RPC between the client and
//! the gateway.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Request
// ============================================================================

/// A method call from client to gateway.
///
/// # Format
///
/// ```json
/// {
///   "type": "req",
///   "id": "uuid",
///   "method": "chat.send",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// Gateway method name.
    pub method: String,

    /// Method parameters, omitted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Creates a new request with auto-generated ID.
    ///
    /// A `Value::Null` params is treated as "no params" and omitted.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self::with_id(RequestId::generate(), method, params)
    }

    /// Creates a new request with specific ID.
    #[inline]
    #[must_use]
    pub fn with_id(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params: (!params.is_null()).then_some(params),
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from gateway to client.
///
/// # Format
///
/// Success:
/// ```json
/// { "type": "res", "id": "uuid", "ok": true, "payload": { ... } }
/// ```
///
/// Error:
/// ```json
/// {
///   "type": "res",
///   "id": "uuid",
///   "ok": false,
///   "error": { "code": "INVALID_REQUEST", "message": "...", "details": { ... } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Whether the call succeeded.
    pub ok: bool,

    /// Result data (if success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Error description (if failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl Response {
    /// Creates a success response.
    #[inline]
    #[must_use]
    pub fn success(id: RequestId, payload: Value) -> Self {
        Self {
            id,
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Creates a failure response.
    #[inline]
    #[must_use]
    pub fn failure(id: RequestId, error: ErrorShape) -> Self {
        Self {
            id,
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    /// Extracts the payload, returning error if the call failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rpc`] carrying the gateway's code, message and
    /// details if `ok` is false.
    pub fn into_result(self) -> Result<Value> {
        if self.ok {
            return Ok(self.payload.unwrap_or(Value::Null));
        }

        let shape = self.error.unwrap_or_default();
        let code = if shape.code.is_empty() {
            "UNKNOWN".to_string()
        } else {
            shape.code
        };
        let message = if shape.message.is_empty() {
            code.clone()
        } else {
            shape.message
        };
        Err(Error::rpc(code, message, shape.details))
    }
}

// ============================================================================
// ErrorShape
// ============================================================================

/// Structured error carried by a failed response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorShape {
    /// Machine-readable error code.
    #[serde(default)]
    pub code: String,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    /// Whether the gateway considers the call retryable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,

    /// Suggested retry delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ErrorShape {
    /// Creates an error shape with code and message.
    #[inline]
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
