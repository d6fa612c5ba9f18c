//! Event routing.
//!
//! Inbound events are fanned out by the session key found in their payload.
//!
//! # Delivery Rules
//!
//! - Global listeners receive every event.
//! - Session listeners receive events whose payload names their key.
//! - An event for a key with no listener is buffered; the first listener
//!   to subscribe receives the backlog in arrival order. A buffer nobody
//!   claims within the grace window is dropped.
//!
//! Buffering exists because push events can outrace the subscription an
//! HTTP handler is still setting up for the same stream.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`EventRouter`] |
//! | `session_key` | Session key extraction |
//! | `subscription` | [`Subscription`] handle |

// ============================================================================
// Submodules
// ============================================================================

/// Router implementation.
pub mod core;

/// Session key extraction.
pub mod session_key;

/// Registration handle.
pub mod subscription;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{DEFAULT_BUFFER_GRACE, EventRouter, Listener, MAX_BUFFERED_EVENTS};
pub use session_key::extract_session_key;
pub use subscription::Subscription;
