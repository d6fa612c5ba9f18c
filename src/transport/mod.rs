//! WebSocket transport layer.
//!
//! This module handles the socket between the client (Rust) and the
//! gateway.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌─────────────────┐
//! │  GatewayClient   │                              │  Gateway        │
//! │                  │         WebSocket            │                 │
//! │  Connection      │─────────────────────────────►│  req handlers   │
//! │   ├ Correlator   │◄─────────────────────────────│  res / event    │
//! │   └ EventRouter  │                              │                 │
//! └──────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::open` - Open the socket, spawn the event loop
//! 2. `Connection::wait_challenge` - Receive the handshake nonce
//! 3. `Connection::call` - Send requests, receive correlated responses
//! 4. `Connection::shutdown` - Close; pending calls fail
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `correlator` | Pending-call map keyed by request id |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Request/response correlation.
pub mod correlator;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, DEFAULT_OPEN_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use correlator::{Correlator, MAX_PENDING_REQUESTS};
