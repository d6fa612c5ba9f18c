//! WebSocket protocol message types.
//!
//! This module defines the frames exchanged between the client and the
//! gateway.
//!
//! # Protocol Overview
//!
//! | Frame | `type` | Direction | Purpose |
//! |-------|--------|-----------|---------|
//! | [`Request`] | `req` | Client → Gateway | Method call |
//! | [`Response`] | `res` | Gateway → Client | Correlated result |
//! | [`Event`] | `event` | Gateway → Client | Unsolicited push |
//!
//! The first request on a socket is always `connect` (see [`connect`]).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connect` | Handshake params, signing payload, `hello-ok` |
//! | `event` | Event and ParsedEvent types |
//! | `frame` | Frame envelope and text codec |
//! | `request` | Request, Response and ErrorShape types |

// ============================================================================
// Submodules
// ============================================================================

/// Connect handshake payloads.
pub mod connect;

/// Event message types.
pub mod event;

/// Frame envelope and codec.
pub mod frame;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use connect::{
    AuthParams, ClientInfo, ConnectParams, DeviceAuthPayload, DeviceBlock, HelloAuth, HelloOk,
    HelloPolicy,
};
pub use event::{Event, ParsedEvent};
pub use frame::{Frame, ParseError, decode, encode};
pub use request::{ErrorShape, Request, Response};
