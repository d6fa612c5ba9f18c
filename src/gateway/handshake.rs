//! Connect handshake.
//!
//! Runs on a freshly opened [`Connection`]:
//!
//! 1. Wait briefly for the `connect.challenge` nonce
//! 2. Sign the device payload (unless device-less)
//! 3. Send `connect` and await `hello-ok`
//! 4. Verify the granted scopes cover `operator.read`

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identity::DeviceIdentity;
use crate::identity::device::unix_millis;
use crate::protocol::connect::{CONNECT_METHOD, PROTOCOL_VERSION, READ_SCOPE, scopes_satisfy};
use crate::protocol::{AuthParams, ClientInfo, ConnectParams, DeviceAuthPayload, DeviceBlock, HelloOk};
use crate::transport::Connection;

use super::config::GatewayConfig;

// ============================================================================
// Handshake
// ============================================================================

/// Inputs of one handshake attempt.
pub(crate) struct Handshake<'a> {
    pub config: &'a GatewayConfig,
    /// `None` runs the handshake device-less.
    pub identity: Option<&'a DeviceIdentity>,
    pub instance_id: Option<&'a str>,
}

impl Handshake<'_> {
    /// Performs the handshake on `connection`.
    ///
    /// # Errors
    ///
    /// - [`Error::Handshake`] if the gateway rejects `connect` or answers
    ///   with a malformed `hello-ok`
    /// - [`Error::InsufficientScope`] if read access was not granted
    /// - [`Error::ConnectionTimeout`] if the gateway does not answer in time
    /// - [`Error::ConnectionClosed`] if the socket closes mid-handshake
    pub async fn perform(&self, connection: &Connection) -> Result<HelloOk> {
        let nonce = connection
            .wait_challenge(self.config.challenge_timeout())
            .await;
        if nonce.is_none() {
            debug!("Proceeding without challenge nonce");
        }

        let params = self.connect_params(nonce.as_deref());
        let params = serde_json::to_value(&params)?;

        let connect_timeout = self.config.connect_timeout();
        let payload = connection
            .call_with_timeout(CONNECT_METHOD, params, connect_timeout)
            .await
            .map_err(|e| match e {
                Error::Rpc { code, message, .. } => {
                    Error::handshake(format!("connect rejected ({code}): {message}"))
                }
                Error::RequestTimeout { .. } => {
                    Error::connection_timeout(
                        u64::try_from(connect_timeout.as_millis()).unwrap_or(u64::MAX),
                    )
                }
                other => other,
            })?;

        let hello = Self::parse_hello(payload)?;
        Self::check_scopes(&hello)?;

        trace!(protocol = hello.protocol, "hello-ok received");
        Ok(hello)
    }

    /// Builds the `connect` params, signing over `nonce` when a device
    /// identity is attached.
    pub fn connect_params(&self, nonce: Option<&str>) -> ConnectParams {
        let config = self.config;
        let scopes = config.scopes().to_vec();
        let device = self.identity.map(|identity| self.device_block(identity, &scopes, nonce));

        ConnectParams {
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            client: ClientInfo {
                id: config.client_id().to_string(),
                version: config.client_version().to_string(),
                platform: config.platform().to_string(),
                mode: config.client_mode().to_string(),
                display_name: config.display_name().map(str::to_string),
                instance_id: self.instance_id.map(str::to_string),
            },
            caps: Vec::new(),
            auth: AuthParams {
                token: config.token().map(str::to_string),
                password: config.password().map(str::to_string),
            },
            role: config.role().to_string(),
            scopes,
            device,
            user_agent: config.user_agent().map(str::to_string),
            locale: config.locale().map(str::to_string),
        }
    }

    /// Signs the canonical payload with the device key.
    fn device_block(
        &self,
        identity: &DeviceIdentity,
        scopes: &[String],
        nonce: Option<&str>,
    ) -> DeviceBlock {
        let signed_at = unix_millis() as i64;
        let payload = DeviceAuthPayload {
            device_id: identity.device_id(),
            client_id: self.config.client_id(),
            client_mode: self.config.client_mode(),
            role: self.config.role(),
            scopes,
            signed_at_ms: signed_at,
            token: self.config.token(),
            nonce,
        }
        .build();

        DeviceBlock {
            id: identity.device_id().to_string(),
            public_key: identity.public_key_base64url(),
            signature: identity.sign(payload.as_bytes()),
            signed_at,
            nonce: nonce.filter(|n| !n.is_empty()).map(str::to_string),
        }
    }

    /// Parses the `connect` response payload.
    fn parse_hello(payload: Value) -> Result<HelloOk> {
        serde_json::from_value(payload)
            .map_err(|e| Error::handshake(format!("Malformed hello-ok: {e}")))
    }

    /// Rejects a connection that cannot read.
    ///
    /// A `hello-ok` without an `auth` block reports no grant and passes.
    fn check_scopes(hello: &HelloOk) -> Result<()> {
        match hello.granted_scopes() {
            Some(granted) if !scopes_satisfy(granted, READ_SCOPE) => {
                Err(Error::insufficient_scope(granted.to_vec()))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
