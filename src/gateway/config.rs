//! Gateway client configuration.
//!
//! Provides [`GatewayConfig`] and its fluent [`GatewayConfigBuilder`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gateway_client::GatewayConfig;
//!
//! # fn example() -> gateway_client::Result<()> {
//! let config = GatewayConfig::builder()
//!     .url("ws://127.0.0.1:18789")
//!     .token("secret")
//!     .request_timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! assert_eq!(config.url().port(), Some(18789));
//! # Ok(())
//! # }
//! ```
//!
//! # Environment
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `GATEWAY_URL` | WebSocket URL | `ws://127.0.0.1:18789` |
//! | `GATEWAY_TOKEN` | Bearer token | none |
//! | `GATEWAY_PASSWORD` | Password | none |
//! | `GATEWAY_ORIGIN` | Explicit `Origin` header | none |
//! | `GATEWAY_DEVICELESS_FALLBACK` | Retry without device identity | off |
//! | `GATEWAY_IDENTITY_DIR` | Identity directory | `~/.gateway-client/identity` |

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::identity::IdentityStore;
use crate::router::DEFAULT_BUFFER_GRACE;
use crate::transport::{DEFAULT_OPEN_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};

// ============================================================================
// Constants
// ============================================================================

/// Gateway URL used when none is configured.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:18789";

/// Client id reported in `connect`.
pub const DEFAULT_CLIENT_ID: &str = "gateway-client";

/// Client mode reported in `connect`.
pub const DEFAULT_CLIENT_MODE: &str = "backend";

/// Requested role.
pub const DEFAULT_ROLE: &str = "operator";

/// Requested scopes.
pub const DEFAULT_SCOPES: &[&str] = &["operator.read", "operator.write"];

/// How long to wait for `connect.challenge`.
pub const DEFAULT_CHALLENGE_TIMEOUT: Duration = Duration::from_secs(3);

/// How long to wait for the `connect` response.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// First reconnect delay.
pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_secs(1);

/// Largest reconnect delay.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Environment variable names.
pub mod vars {
    /// WebSocket URL.
    pub const URL: &str = "GATEWAY_URL";
    /// Bearer token.
    pub const TOKEN: &str = "GATEWAY_TOKEN";
    /// Password.
    pub const PASSWORD: &str = "GATEWAY_PASSWORD";
    /// Explicit `Origin` header.
    pub const ORIGIN: &str = "GATEWAY_ORIGIN";
    /// Device-less fallback flag.
    pub const DEVICELESS_FALLBACK: &str = "GATEWAY_DEVICELESS_FALLBACK";
    /// Identity directory.
    pub const IDENTITY_DIR: &str = "GATEWAY_IDENTITY_DIR";
}

// ============================================================================
// GatewayConfig
// ============================================================================

/// Validated client configuration.
///
/// Build with [`GatewayConfig::builder`] or load with
/// [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    url: Url,
    token: Option<String>,
    password: Option<String>,
    origin: Option<String>,
    deviceless_fallback: bool,
    identity_dir: PathBuf,

    client_id: String,
    client_version: String,
    platform: String,
    client_mode: String,
    display_name: Option<String>,
    role: String,
    scopes: Vec<String>,
    locale: Option<String>,
    user_agent: Option<String>,

    request_timeout: Duration,
    challenge_timeout: Duration,
    open_timeout: Duration,
    connect_timeout: Duration,
    buffer_grace: Duration,
    backoff_floor: Duration,
    backoff_cap: Duration,
}

impl GatewayConfig {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::new()
    }

    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `GATEWAY_URL` is not a valid
    /// WebSocket URL.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is not a valid WebSocket URL.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(url) = get(vars::URL) {
            builder = builder.url(url.trim());
        }
        if let Some(token) = get(vars::TOKEN) {
            builder = builder.token(token);
        }
        if let Some(password) = get(vars::PASSWORD) {
            builder = builder.password(password);
        }
        if let Some(origin) = get(vars::ORIGIN) {
            builder = builder.origin(origin.trim());
        }
        if let Some(dir) = get(vars::IDENTITY_DIR) {
            builder = builder.identity_dir(dir);
        }
        builder = builder.deviceless_fallback(get(vars::DEVICELESS_FALLBACK).is_some_and(|v| parse_flag(&v)));

        builder.build()
    }
}

// ============================================================================
// GatewayConfig - Accessors
// ============================================================================

impl GatewayConfig {
    /// Returns the gateway URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the bearer token.
    #[inline]
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the password.
    #[inline]
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Returns the explicit `Origin` header.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Returns `true` if a failed connect is retried without device identity.
    #[inline]
    #[must_use]
    pub fn deviceless_fallback(&self) -> bool {
        self.deviceless_fallback
    }

    /// Returns the identity directory.
    #[inline]
    #[must_use]
    pub fn identity_dir(&self) -> &Path {
        &self.identity_dir
    }

    /// Returns the client id.
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the client version.
    #[inline]
    #[must_use]
    pub fn client_version(&self) -> &str {
        &self.client_version
    }

    /// Returns the platform name.
    #[inline]
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Returns the client mode.
    #[inline]
    #[must_use]
    pub fn client_mode(&self) -> &str {
        &self.client_mode
    }

    /// Returns the display name.
    #[inline]
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the requested role.
    #[inline]
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Returns the requested scopes.
    #[inline]
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns the locale.
    #[inline]
    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Returns the user agent.
    #[inline]
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Returns the default per-call timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns how long to wait for the challenge.
    #[inline]
    #[must_use]
    pub fn challenge_timeout(&self) -> Duration {
        self.challenge_timeout
    }

    /// Returns how long to wait for the socket to open.
    #[inline]
    #[must_use]
    pub fn open_timeout(&self) -> Duration {
        self.open_timeout
    }

    /// Returns how long to wait for the `connect` response.
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the orphan buffer grace window.
    #[inline]
    #[must_use]
    pub fn buffer_grace(&self) -> Duration {
        self.buffer_grace
    }

    /// Returns the first reconnect delay.
    #[inline]
    #[must_use]
    pub fn backoff_floor(&self) -> Duration {
        self.backoff_floor
    }

    /// Returns the largest reconnect delay.
    #[inline]
    #[must_use]
    pub fn backoff_cap(&self) -> Duration {
        self.backoff_cap
    }
}

// ============================================================================
// GatewayConfigBuilder
// ============================================================================

/// Builder for [`GatewayConfig`].
#[derive(Debug, Clone)]
pub struct GatewayConfigBuilder {
    url: String,
    token: Option<String>,
    password: Option<String>,
    origin: Option<String>,
    deviceless_fallback: bool,
    identity_dir: Option<PathBuf>,
    client_id: String,
    client_version: String,
    platform: String,
    client_mode: String,
    display_name: Option<String>,
    role: String,
    scopes: Vec<String>,
    locale: Option<String>,
    user_agent: Option<String>,
    request_timeout: Duration,
    challenge_timeout: Duration,
    open_timeout: Duration,
    connect_timeout: Duration,
    buffer_grace: Duration,
    backoff_floor: Duration,
    backoff_cap: Duration,
}

impl Default for GatewayConfigBuilder {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            token: None,
            password: None,
            origin: None,
            deviceless_fallback: false,
            identity_dir: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: env::consts::OS.to_string(),
            client_mode: DEFAULT_CLIENT_MODE.to_string(),
            display_name: None,
            role: DEFAULT_ROLE.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            locale: None,
            user_agent: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            challenge_timeout: DEFAULT_CHALLENGE_TIMEOUT,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            buffer_grace: DEFAULT_BUFFER_GRACE,
            backoff_floor: DEFAULT_BACKOFF_FLOOR,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl GatewayConfigBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gateway WebSocket URL.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the bearer token.
    #[inline]
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the password.
    #[inline]
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets an explicit `Origin` header for origin allowlists.
    #[inline]
    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Enables one retry without device identity after a failed connect.
    #[inline]
    #[must_use]
    pub fn deviceless_fallback(mut self, enabled: bool) -> Self {
        self.deviceless_fallback = enabled;
        self
    }

    /// Sets the directory holding the identity files.
    #[inline]
    #[must_use]
    pub fn identity_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.identity_dir = Some(dir.into());
        self
    }

    /// Sets the client id.
    #[inline]
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Sets the client version.
    #[inline]
    #[must_use]
    pub fn client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Sets the platform name.
    #[inline]
    #[must_use]
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Sets the client mode.
    #[inline]
    #[must_use]
    pub fn client_mode(mut self, mode: impl Into<String>) -> Self {
        self.client_mode = mode.into();
        self
    }

    /// Sets the display name.
    #[inline]
    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the requested role.
    #[inline]
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Sets the requested scopes.
    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the locale.
    #[inline]
    #[must_use]
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Sets the user agent.
    #[inline]
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets the default per-call timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets how long to wait for the challenge.
    #[inline]
    #[must_use]
    pub fn challenge_timeout(mut self, timeout: Duration) -> Self {
        self.challenge_timeout = timeout;
        self
    }

    /// Sets how long to wait for the socket to open.
    #[inline]
    #[must_use]
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Sets how long to wait for the `connect` response.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the orphan buffer grace window.
    #[inline]
    #[must_use]
    pub fn buffer_grace(mut self, grace: Duration) -> Self {
        self.buffer_grace = grace;
        self
    }

    /// Sets the reconnect backoff range.
    #[inline]
    #[must_use]
    pub fn backoff(mut self, floor: Duration, cap: Duration) -> Self {
        self.backoff_floor = floor;
        self.backoff_cap = cap;
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is invalid or not `ws`/`wss`
    /// - [`Error::Config`] if role or scopes are empty
    /// - [`Error::Config`] if a timeout is zero
    /// - [`Error::Config`] if the backoff floor exceeds its cap
    pub fn build(self) -> Result<GatewayConfig> {
        let url = self.validate_url()?;
        self.validate_auth()?;
        self.validate_timing()?;

        let identity_dir = self
            .identity_dir
            .or_else(IdentityStore::default_dir)
            .unwrap_or_else(|| env::temp_dir().join("gateway-client").join("identity"));

        Ok(GatewayConfig {
            url,
            token: self.token,
            password: self.password,
            origin: self.origin,
            deviceless_fallback: self.deviceless_fallback,
            identity_dir,
            client_id: self.client_id,
            client_version: self.client_version,
            platform: self.platform,
            client_mode: self.client_mode,
            display_name: self.display_name,
            role: self.role,
            scopes: self.scopes,
            locale: self.locale,
            user_agent: self.user_agent,
            request_timeout: self.request_timeout,
            challenge_timeout: self.challenge_timeout,
            open_timeout: self.open_timeout,
            connect_timeout: self.connect_timeout,
            buffer_grace: self.buffer_grace,
            backoff_floor: self.backoff_floor,
            backoff_cap: self.backoff_cap,
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

impl GatewayConfigBuilder {
    /// Validates the gateway URL.
    fn validate_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::config(format!("Invalid gateway URL '{}': {e}", self.url)))?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(Error::config(format!(
                "Gateway URL must use ws:// or wss://, got '{other}://'"
            ))),
        }
    }

    /// Validates role and scopes.
    fn validate_auth(&self) -> Result<()> {
        if self.role.trim().is_empty() {
            return Err(Error::config("Role must not be empty"));
        }
        if self.scopes.is_empty() {
            return Err(Error::config("At least one scope is required"));
        }
        if self.client_id.trim().is_empty() {
            return Err(Error::config("Client id must not be empty"));
        }
        Ok(())
    }

    /// Validates timeouts and backoff.
    fn validate_timing(&self) -> Result<()> {
        let timeouts = [
            ("request", self.request_timeout),
            ("challenge", self.challenge_timeout),
            ("open", self.open_timeout),
            ("connect", self.connect_timeout),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, t)| t.is_zero()) {
            return Err(Error::config(format!("{name} timeout must be non-zero")));
        }

        if self.backoff_floor.is_zero() {
            return Err(Error::config("Backoff floor must be non-zero"));
        }
        if self.backoff_floor > self.backoff_cap {
            return Err(Error::config(format!(
                "Backoff floor {:?} exceeds cap {:?}",
                self.backoff_floor, self.backoff_cap
            )));
        }
        Ok(())
    }
}

/// Parses a boolean environment flag.
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ============================================================================
// Tests
// ============================================================================
