//! Device keypair and derived device id.
//!
//! The device id is the lowercase hex SHA-256 of the raw ed25519 public
//! key, so it can always be recomputed from the key material. Keys and
//! signatures travel as unpadded base64url.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD as Base64Standard, URL_SAFE_NO_PAD as Base64Url};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Raw ed25519 key length in bytes.
pub const KEY_LEN: usize = 32;

// ============================================================================
// DeviceIdentity
// ============================================================================

/// Persistent signing identity of this installation.
#[derive(Clone)]
pub struct DeviceIdentity {
    /// Hex SHA-256 of the public key.
    device_id: String,
    /// Private signing key.
    signing_key: SigningKey,
    /// Creation time in ms since the epoch.
    created_at_ms: u64,
}

impl DeviceIdentity {
    /// Generates a fresh identity from the OS random number generator.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng), unix_millis())
    }

    /// Builds an identity around an existing key.
    #[must_use]
    pub fn from_signing_key(signing_key: SigningKey, created_at_ms: u64) -> Self {
        let device_id = derive_device_id(signing_key.verifying_key().as_bytes());
        Self {
            device_id,
            signing_key,
            created_at_ms,
        }
    }

    /// Returns the device id.
    #[inline]
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the creation time in ms since the epoch.
    #[inline]
    #[must_use]
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// Returns the raw public key.
    #[inline]
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; KEY_LEN] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Returns the raw public key as base64url.
    #[inline]
    #[must_use]
    pub fn public_key_base64url(&self) -> String {
        Base64Url.encode(self.public_key_bytes())
    }

    /// Returns the raw private key as base64url.
    #[inline]
    pub(crate) fn private_key_base64url(&self) -> String {
        Base64Url.encode(self.signing_key.to_bytes())
    }

    /// Signs `payload`, returning the signature as base64url.
    #[must_use]
    pub fn sign(&self, payload: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(payload);
        Base64Url.encode(signature.to_bytes())
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id)
            .field("public_key", &self.public_key_base64url())
            .field("created_at_ms", &self.created_at_ms)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Derives the device id from a raw public key.
#[must_use]
pub fn derive_device_id(public_key: &[u8]) -> String {
    hex::encode(Sha256::digest(public_key))
}

/// Decodes a base64url (or standard base64) string.
///
/// # Errors
///
/// Returns [`Error::Identity`] if neither alphabet decodes the input.
pub fn decode_base64(input: &str) -> Result<Vec<u8>> {
    Base64Url
        .decode(input.as_bytes())
        .or_else(|_| Base64Standard.decode(input.as_bytes()))
        .map_err(|e| Error::identity(format!("invalid base64: {e}")))
}

/// Decodes a raw 32-byte key from base64.
///
/// # Errors
///
/// Returns [`Error::Identity`] on bad encoding or length.
pub fn decode_key(input: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = decode_base64(input)?;
    <[u8; KEY_LEN]>::try_from(bytes.as_slice())
        .map_err(|_| Error::identity(format!("expected {KEY_LEN}-byte key, got {}", bytes.len())))
}

/// Verifies a base64url signature against a base64url public key.
#[must_use]
pub fn verify_signature(public_key: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(key) = decode_key(public_key) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key) else {
        return false;
    };
    let Ok(sig) = decode_base64(signature) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(&sig) else {
        return false;
    };
    key.verify(payload, &sig).is_ok()
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
