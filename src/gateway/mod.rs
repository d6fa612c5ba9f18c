//! Gateway connection management and public client.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Exponential reconnect delay |
//! | `client` | [`GatewayClient`] facade |
//! | `config` | [`GatewayConfig`] and builder |
//! | `handshake` | Challenge, signing, `connect`, scope check |
//! | `supervisor` | Socket lifecycle and reconnects |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect backoff.
pub mod backoff;

/// Public client facade.
pub mod client;

/// Client configuration.
pub mod config;

/// Connect handshake.
mod handshake;

/// Socket lifecycle.
pub mod supervisor;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::Backoff;
pub use client::GatewayClient;
pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use supervisor::{ConnectionState, Supervisor};
