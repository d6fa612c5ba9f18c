//! Gateway client - authenticated WebSocket RPC and event streaming.
//!
//! This library connects a backend process to a gateway over one
//! long-lived WebSocket, proves the installation's device identity during
//! the handshake, and exposes correlated RPC plus per-session event
//! streams.
//!
//! # Architecture
//!
//! - **Identity**: ed25519 keypair persisted on disk; device id is the
//!   SHA-256 of the public key
//! - **Wire**: JSON frames tagged `req`, `res` and `event`
//! - **Transport**: one tokio task per socket serializes all inbound
//!   handling
//! - **Supervisor**: one socket per client, shared connect attempts,
//!   exponential reconnect
//!
//! Key design principles:
//!
//! - Pending calls fail fast when the socket drops; they never hang
//!   across a reconnect
//! - Subscriptions survive reconnects
//! - Events that outrace their subscriber are buffered for a grace window
//!
//! # Quick Start
//!
//! ```no_run
//! use gateway_client::{GatewayClient, GatewayConfig, Result};
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = GatewayClient::new(
//!         GatewayConfig::builder()
//!             .url("ws://127.0.0.1:18789")
//!             .token("secret")
//!             .build()?,
//!     );
//!
//!     client.ensure_connected().await?;
//!
//!     let _sub = client.subscribe("main", |event| {
//!         println!("{}: {}", event.event, event.payload);
//!     });
//!
//!     let health: Value = client.rpc("health", json!({})).await?;
//!     println!("{health}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`gateway`] | [`GatewayClient`], configuration, supervisor |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`identity`] | Device keypair and its on-disk store |
//! | [`protocol`] | WebSocket frame types and codec |
//! | [`router`] | Session and global event fan-out |
//! | [`transport`] | WebSocket connection and correlation |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Gateway client, configuration and connection supervisor.
///
/// Use [`GatewayClient::new`] or [`GatewayClient::shared`].
pub mod gateway;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Device identity: keypair, device id, persistence.
pub mod identity;

/// WebSocket protocol message types.
pub mod protocol;

/// Event routing with orphan buffering.
pub mod router;

/// WebSocket transport layer.
///
/// Handles the socket event loop and request correlation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use gateway::{ConnectionState, GatewayClient, GatewayConfig, GatewayConfigBuilder};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{RequestId, SessionKey, SubscriptionId};

// Identity types
pub use identity::{DeviceIdentity, IdentityStore};

// Protocol types
pub use protocol::{Event, HelloOk, ParsedEvent};

// Router types
pub use router::{EventRouter, Subscription};
