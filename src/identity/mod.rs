//! Device identity management.
//!
//! Each installation owns one ed25519 keypair. The gateway recognizes the
//! installation by the key's fingerprint and checks a signature over the
//! handshake payload on every connect.
//!
//! # Example
//!
//! ```no_run
//! use gateway_client::identity::IdentityStore;
//!
//! let store = IdentityStore::new("/tmp/gateway-identity");
//! let identity = store.load_or_create();
//! let signature = identity.sign(b"payload");
//! println!("{} signed {signature}", identity.device_id());
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Keypair, device id derivation and signing.
pub mod device;

/// File persistence.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use device::{DeviceIdentity, derive_device_id, verify_signature};
pub use store::IdentityStore;
