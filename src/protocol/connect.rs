//! Connect handshake payloads.
//!
//! The first request on every socket is `connect`. Its params describe the
//! client, its credentials and, unless running device-less, a signature
//! over the [`DeviceAuthPayload`] proving possession of the device key.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Constants
// ============================================================================

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: u32 = 3;

/// Method name of the handshake request.
pub const CONNECT_METHOD: &str = "connect";

/// Scope a connection must be granted to be usable.
pub const READ_SCOPE: &str = "operator.read";

// ============================================================================
// ConnectParams
// ============================================================================

/// Params of the `connect` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Lowest protocol version accepted.
    pub min_protocol: u32,
    /// Highest protocol version accepted.
    pub max_protocol: u32,
    /// Client metadata.
    pub client: ClientInfo,
    /// Client capabilities.
    #[serde(default)]
    pub caps: Vec<String>,
    /// Shared-secret credentials.
    #[serde(default)]
    pub auth: AuthParams,
    /// Requested role.
    pub role: String,
    /// Requested scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Device proof; absent in device-less mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceBlock>,
    /// Client user agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Client locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// Client metadata sent with `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client id.
    pub id: String,
    /// Client version.
    pub version: String,
    /// Platform name.
    pub platform: String,
    /// Client mode.
    pub mode: String,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Persistent installation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// Bearer token or password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthParams {
    /// Bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Device proof attached to `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBlock {
    /// Device id (hex SHA-256 of the public key).
    pub id: String,
    /// Raw public key, base64url.
    pub public_key: String,
    /// Signature over the [`DeviceAuthPayload`], base64url.
    pub signature: String,
    /// Signing timestamp in ms.
    pub signed_at: i64,
    /// Challenge nonce that was signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

// ============================================================================
// DeviceAuthPayload
// ============================================================================

/// Canonical string signed by the device key.
///
/// Layout: `version|deviceId|clientId|clientMode|role|scopes|signedAtMs|token[|nonce]`
/// where `version` is `v2` with a nonce and `v1` without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthPayload<'a> {
    /// Device id.
    pub device_id: &'a str,
    /// Client id.
    pub client_id: &'a str,
    /// Client mode.
    pub client_mode: &'a str,
    /// Requested role.
    pub role: &'a str,
    /// Requested scopes.
    pub scopes: &'a [String],
    /// Signing timestamp in ms.
    pub signed_at_ms: i64,
    /// Bearer token, if any.
    pub token: Option<&'a str>,
    /// Challenge nonce; empty counts as absent.
    pub nonce: Option<&'a str>,
}

impl DeviceAuthPayload<'_> {
    /// Builds the delimiter-joined signing string.
    #[must_use]
    pub fn build(&self) -> String {
        let nonce = self.nonce.filter(|n| !n.is_empty());
        let version = if nonce.is_some() { "v2" } else { "v1" };
        let signed_at = self.signed_at_ms.to_string();
        let scopes = self.scopes.join(",");

        let mut parts = vec![
            version,
            self.device_id,
            self.client_id,
            self.client_mode,
            self.role,
            scopes.as_str(),
            signed_at.as_str(),
            self.token.unwrap_or_default(),
        ];
        if let Some(nonce) = nonce {
            parts.push(nonce);
        }
        parts.join("|")
    }
}

// ============================================================================
// HelloOk
// ============================================================================

/// Payload of a successful `connect` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    /// Negotiated protocol version.
    #[serde(default)]
    pub protocol: u32,
    /// Server metadata.
    #[serde(default)]
    pub server: Value,
    /// Advertised methods and events.
    #[serde(default)]
    pub features: Value,
    /// Initial state snapshot.
    #[serde(default)]
    pub snapshot: Value,
    /// Device token grant, when a device token was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<HelloAuth>,
    /// Connection policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<HelloPolicy>,
}

impl HelloOk {
    /// Returns the granted scopes, or `None` when the gateway reported none.
    #[inline]
    #[must_use]
    pub fn granted_scopes(&self) -> Option<&[String]> {
        self.auth.as_ref().map(|a| a.scopes.as_slice())
    }

    /// Returns the heartbeat interval announced by the gateway.
    #[inline]
    #[must_use]
    pub fn tick_interval_ms(&self) -> Option<u64> {
        self.policy
            .as_ref()
            .and_then(|p| p.tick_interval_ms)
            .filter(|ms| *ms > 0)
    }
}

/// Device token grant inside [`HelloOk`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloAuth {
    /// Issued device token.
    #[serde(default)]
    pub device_token: Option<String>,
    /// Granted role.
    #[serde(default)]
    pub role: Option<String>,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Issue time in ms.
    #[serde(default)]
    pub issued_at_ms: Option<u64>,
}

/// Connection policy inside [`HelloOk`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPolicy {
    /// Largest accepted frame.
    #[serde(default)]
    pub max_payload: Option<u64>,
    /// Largest send buffer before the gateway drops the client.
    #[serde(default)]
    pub max_buffered_bytes: Option<u64>,
    /// Heartbeat interval.
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,
}

// ============================================================================
// Scope Checks
// ============================================================================

/// Returns `true` if `granted` covers `required`.
///
/// `operator.admin` covers every operator scope and `operator.write`
/// covers `operator.read`.
#[must_use]
pub fn scopes_satisfy(granted: &[String], required: &str) -> bool {
    granted.iter().any(|scope| {
        scope == required
            || (scope == "operator.admin" && required.starts_with("operator."))
            || (scope == "operator.write" && required == READ_SCOPE)
    })
}

// ============================================================================
// Tests
// ============================================================================
