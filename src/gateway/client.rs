//! Gateway client facade.
//!
//! [`GatewayClient`] is the surface consumed by the rest of an application:
//! typed RPC, session and global subscriptions, and a connectivity check.
//!
//! # Example
//!
//! ```no_run
//! use gateway_client::{GatewayClient, GatewayConfig, Result};
//! use serde_json::{Value, json};
//!
//! # async fn example() -> Result<()> {
//! let client = GatewayClient::new(GatewayConfig::from_env()?);
//!
//! let _sub = client.subscribe("main", |event| {
//!     println!("{} {}", event.event, event.payload);
//! });
//!
//! let reply: Value = client
//!     .rpc("chat.send", json!({"sessionKey": "main", "message": "hi"}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::identifiers::SessionKey;
use crate::protocol::{Event, HelloOk};
use crate::router::{EventRouter, Subscription};

use super::config::GatewayConfig;
use super::supervisor::{ConnectionState, Supervisor};

// ============================================================================
// Shared Instance
// ============================================================================

static SHARED: OnceLock<GatewayClient> = OnceLock::new();

// ============================================================================
// GatewayClient
// ============================================================================

/// Client for one gateway.
///
/// Cloning yields another handle to the same socket, listeners and
/// pending calls. Most applications use one process-wide instance via
/// [`GatewayClient::shared`].
#[derive(Clone)]
pub struct GatewayClient {
    supervisor: Supervisor,
}

impl GatewayClient {
    /// Creates a client. No socket is opened until first use.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        let router = EventRouter::new(config.buffer_grace());
        Self {
            supervisor: Supervisor::new(config, router),
        }
    }

    /// Creates a client configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the environment is invalid.
    pub fn from_env() -> Result<Self> {
        GatewayConfig::from_env().map(Self::new)
    }

    /// Returns the process-wide client, creating it from the environment
    /// on first call.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the environment is invalid.
    pub fn shared() -> Result<&'static Self> {
        if let Some(client) = SHARED.get() {
            return Ok(client);
        }

        let client = Self::from_env()?;
        Ok(SHARED.get_or_init(|| client))
    }
}

// ============================================================================
// GatewayClient - RPC
// ============================================================================

impl GatewayClient {
    /// Calls `method` and decodes its payload, using the configured
    /// request timeout.
    ///
    /// Connects first if needed. `()` serializes to absent params.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::ConnectFailed`] / [`crate::Error::Destroyed`] if no
    ///   socket can be established
    /// - [`crate::Error::Rpc`] if the gateway answers `ok = false`
    /// - [`crate::Error::RequestTimeout`] if no answer arrives in time
    /// - [`crate::Error::ConnectionClosed`] if the socket drops mid-call
    /// - [`crate::Error::Json`] if params or payload do not (de)serialize
    pub async fn rpc<T, P>(&self, method: &str, params: P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let timeout = self.supervisor.config().request_timeout();
        self.rpc_with_timeout(method, params, timeout).await
    }

    /// Calls `method` with a custom timeout.
    ///
    /// # Errors
    ///
    /// See [`GatewayClient::rpc`].
    pub async fn rpc_with_timeout<T, P>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let params = serde_json::to_value(params)?;
        let payload = self.supervisor.call(method, params, timeout).await?;
        Ok(serde_json::from_value(payload)?)
    }
}

// ============================================================================
// GatewayClient - Events
// ============================================================================

impl GatewayClient {
    /// Listens to events of one session.
    ///
    /// Events that arrived for the session before anyone listened are
    /// delivered first, in order.
    pub fn subscribe<F>(&self, session_key: impl Into<SessionKey>, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.supervisor.router().subscribe(session_key, listener)
    }

    /// Listens to every event.
    pub fn subscribe_all<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.supervisor.router().subscribe_all(listener)
    }

    /// Returns the event router.
    #[inline]
    #[must_use]
    pub fn router(&self) -> &EventRouter {
        self.supervisor.router()
    }
}

// ============================================================================
// GatewayClient - Lifecycle
// ============================================================================

impl GatewayClient {
    /// Resolves once an authenticated socket is up.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Destroyed`] after [`GatewayClient::destroy`]
    /// - [`crate::Error::ConnectFailed`] if the attempt fails
    #[inline]
    pub async fn ensure_connected(&self) -> Result<()> {
        self.supervisor.ensure_connected().await
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Returns the `hello-ok` of the current socket.
    #[inline]
    #[must_use]
    pub fn hello(&self) -> Option<Arc<HelloOk>> {
        self.supervisor.hello()
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        self.supervisor.config()
    }

    /// Shuts the client down for good.
    #[inline]
    pub fn destroy(&self) {
        self.supervisor.destroy();
    }
}

// ============================================================================
// Tests
// ============================================================================
