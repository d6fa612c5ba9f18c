//! Error types for the gateway client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use gateway_client::{GatewayClient, Result};
//!
//! async fn example(client: &GatewayClient) -> Result<()> {
//!     client.ensure_connected().await?;
//!     let status: serde_json::Value = client.rpc("status", ()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Handshake | [`Error::Handshake`], [`Error::InsufficientScope`], [`Error::ConnectFailed`] |
//! | RPC | [`Error::Rpc`], [`Error::RequestTimeout`], [`Error::Protocol`] |
//! | Lifecycle | [`Error::Destroyed`] |
//! | Identity | [`Error::Identity`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the socket cannot be opened or a frame cannot be sent.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timed out opening the socket or waiting for the connect response.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed.
    ///
    /// Every call pending when the socket drops fails with this error.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// The gateway rejected or broke the connect handshake.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    /// The gateway accepted the connection without granting read access.
    #[error("Insufficient scopes granted: [{}]", granted.join(", "))]
    InsufficientScope {
        /// Scopes the gateway reported as granted.
        granted: Vec<String>,
    },

    /// A shared connect attempt failed.
    ///
    /// Every caller awaiting the same in-flight attempt observes the same
    /// underlying error.
    #[error("Connect attempt failed: {0}")]
    ConnectFailed(#[source] Arc<Error>),

    // ========================================================================
    // RPC Errors
    // ========================================================================
    /// The gateway answered a request with `ok = false`.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// Machine-readable error code.
        code: String,
        /// Human-readable error message.
        message: String,
        /// Optional structured details.
        details: Option<Value>,
    },

    /// Request timeout.
    ///
    /// Returned when no response arrives within the call's timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Protocol violation or unexpected payload.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The client was shut down; no further connections are made.
    #[error("Gateway client destroyed")]
    Destroyed,

    // ========================================================================
    // Identity Errors
    // ========================================================================
    /// Device identity material could not be read, parsed or written.
    #[error("Identity error: {message}")]
    Identity {
        /// Description of the identity error.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates an insufficient scope error.
    #[inline]
    pub fn insufficient_scope(granted: Vec<String>) -> Self {
        Self::InsufficientScope { granted }
    }

    /// Creates an RPC error from a gateway error shape.
    #[inline]
    pub fn rpc(code: impl Into<String>, message: impl Into<String>, details: Option<Value>) -> Self {
        Self::Rpc {
            code: code.into(),
            message: message.into(),
            details,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an identity error.
    #[inline]
    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. } => true,
            Self::ConnectFailed(inner) => inner.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Connection { .. }
            | Self::ConnectionTimeout { .. }
            | Self::ConnectionClosed
            | Self::WebSocket(_) => true,
            Self::ConnectFailed(inner) => inner.is_connection_error(),
            _ => false,
        }
    }

    /// Returns `true` if the handshake itself was refused.
    #[inline]
    #[must_use]
    pub fn is_handshake_error(&self) -> bool {
        match self {
            Self::Handshake { .. } | Self::InsufficientScope { .. } => true,
            Self::ConnectFailed(inner) => inner.is_handshake_error(),
            _ => false,
        }
    }

    /// Returns the gateway error code if this is an RPC error.
    #[inline]
    #[must_use]
    pub fn rpc_code(&self) -> Option<&str> {
        match self {
            Self::Rpc { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry once the supervisor has
    /// reconnected.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ConnectionTimeout { .. }
            | Self::ConnectionClosed
            | Self::Connection { .. }
            | Self::RequestTimeout { .. }
            | Self::WebSocket(_) => true,
            Self::ConnectFailed(inner) => inner.is_recoverable(),
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
