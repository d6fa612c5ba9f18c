//! Connection supervisor.
//!
//! Owns the one socket to the gateway and drives its state machine:
//!
//! ```text
//! Disconnected ──ensure_connected──► Connecting ──hello-ok──► Connected
//!      ▲                                 │                        │
//!      └───── failure / reconnect timer ◄┘◄──── close / silence ──┘
//!
//! any state ──destroy──► Destroyed
//! ```
//!
//! Concurrent callers of [`Supervisor::ensure_connected`] share one
//! in-flight attempt (the connect barrier). Failed attempts and dropped
//! sockets schedule a reconnect with exponential backoff; there is at
//! most one reconnect timer at a time.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identity::{DeviceIdentity, IdentityStore};
use crate::protocol::HelloOk;
use crate::router::EventRouter;
use crate::transport::Connection;

use super::backoff::Backoff;
use super::config::GatewayConfig;
use super::handshake::Handshake;

// ============================================================================
// Types
// ============================================================================

/// Outcome of one connect attempt, shared by all of its waiters.
type ConnectBarrier = Shared<BoxFuture<'static, std::result::Result<(), Arc<Error>>>>;

/// Lifecycle state of the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket; a reconnect may be scheduled.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Handshake complete; requests flow.
    Connected,
    /// Shut down for good.
    Destroyed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Mutable supervisor state, guarded by one lock.
struct SupervisorState {
    status: ConnectionState,
    connection: Option<Connection>,
    hello: Option<Arc<HelloOk>>,
    in_flight: Option<ConnectBarrier>,
    attempt: Option<AbortHandle>,
    reconnect: Option<JoinHandle<()>>,
    backoff: Backoff,
    /// Bumped per established socket so stale monitors stand down.
    epoch: u64,
}

struct SupervisorInner {
    config: GatewayConfig,
    router: EventRouter,
    store: IdentityStore,
    /// Identity and installation id, loaded once per process.
    identity: Mutex<Option<(DeviceIdentity, String)>>,
    state: Mutex<SupervisorState>,
}

// ============================================================================
// Supervisor
// ============================================================================

/// Owner of the gateway socket and its reconnect policy.
///
/// Cloning yields another handle to the same supervisor.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

impl Supervisor {
    /// Creates a disconnected supervisor.
    ///
    /// Nothing is opened until [`Supervisor::ensure_connected`].
    #[must_use]
    pub fn new(config: GatewayConfig, router: EventRouter) -> Self {
        let backoff = Backoff::new(config.backoff_floor(), config.backoff_cap());
        let store = IdentityStore::new(config.identity_dir());

        Self {
            inner: Arc::new(SupervisorInner {
                config,
                router,
                store,
                identity: Mutex::new(None),
                state: Mutex::new(SupervisorState {
                    status: ConnectionState::Disconnected,
                    connection: None,
                    hello: None,
                    in_flight: None,
                    attempt: None,
                    reconnect: None,
                    backoff,
                    epoch: 0,
                }),
            }),
        }
    }
}

// ============================================================================
// Supervisor - Public API
// ============================================================================

impl Supervisor {
    /// Resolves once an authenticated socket is up.
    ///
    /// Returns immediately when already connected. Concurrent callers
    /// await the same attempt.
    ///
    /// # Errors
    ///
    /// - [`Error::Destroyed`] after [`Supervisor::destroy`]
    /// - [`Error::ConnectFailed`] wrapping the attempt's failure
    pub async fn ensure_connected(&self) -> Result<()> {
        let barrier = {
            let mut state = self.inner.state.lock();

            match state.status {
                ConnectionState::Destroyed => return Err(Error::Destroyed),
                ConnectionState::Connected
                    if state.connection.as_ref().is_some_and(|c| !c.is_closed()) =>
                {
                    return Ok(());
                }
                _ => {}
            }

            match state.in_flight.clone() {
                Some(barrier) => barrier,
                None => self.inner.start_attempt(&mut state),
            }
        };

        barrier.await.map_err(|e| {
            if matches!(*e, Error::Destroyed) {
                Error::Destroyed
            } else {
                Error::ConnectFailed(e)
            }
        })
    }

    /// Connects if needed, then sends one request.
    ///
    /// # Errors
    ///
    /// Any error of [`Supervisor::ensure_connected`] or
    /// [`Connection::call_with_timeout`].
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        self.ensure_connected().await?;

        let connection = self
            .inner
            .state
            .lock()
            .connection
            .clone()
            .ok_or(Error::ConnectionClosed)?;

        connection.call_with_timeout(method, params, timeout).await
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().status
    }

    /// Returns the `hello-ok` of the current socket.
    #[inline]
    #[must_use]
    pub fn hello(&self) -> Option<Arc<HelloOk>> {
        self.inner.state.lock().hello.clone()
    }

    /// Returns the delay the next reconnect will wait.
    #[inline]
    #[must_use]
    pub fn next_reconnect_delay(&self) -> Duration {
        self.inner.state.lock().backoff.peek()
    }

    /// Returns the number of calls awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .connection
            .as_ref()
            .map_or(0, Connection::pending_count)
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Returns the event router.
    #[inline]
    #[must_use]
    pub fn router(&self) -> &EventRouter {
        &self.inner.router
    }

    /// Shuts down for good.
    ///
    /// Cancels the reconnect timer and any in-flight attempt, closes the
    /// socket and drops every listener. Later connects fail with
    /// [`Error::Destroyed`].
    pub fn destroy(&self) {
        let (connection, reconnect, attempt) = {
            let mut state = self.inner.state.lock();
            if state.status == ConnectionState::Destroyed {
                return;
            }
            state.status = ConnectionState::Destroyed;
            state.hello = None;
            state.in_flight = None;
            (
                state.connection.take(),
                state.reconnect.take(),
                state.attempt.take(),
            )
        };

        if let Some(timer) = reconnect {
            timer.abort();
        }
        if let Some(attempt) = attempt {
            attempt.abort();
        }
        if let Some(connection) = connection {
            connection.shutdown();
        }
        self.inner.router.clear();

        info!("Gateway client destroyed");
    }
}

// ============================================================================
// SupervisorInner - Connect
// ============================================================================

impl SupervisorInner {
    /// Spawns a connect attempt and installs its barrier.
    fn start_attempt(self: &Arc<Self>, state: &mut SupervisorState) -> ConnectBarrier {
        state.status = ConnectionState::Connecting;
        if let Some(timer) = state.reconnect.take() {
            timer.abort();
        }

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.run_attempt().await });
        state.attempt = Some(task.abort_handle());

        let barrier = async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(Arc::new(Error::Destroyed)),
                Err(e) => Err(Arc::new(Error::connection(format!("Connect task failed: {e}")))),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(barrier.clone());
        debug!(url = %self.config.url(), "Connect attempt started");
        barrier
    }

    /// Runs one attempt and applies its outcome.
    async fn run_attempt(self: Arc<Self>) -> std::result::Result<(), Arc<Error>> {
        let result = self.connect_once().await;

        let mut state = self.state.lock();
        state.in_flight = None;
        state.attempt = None;

        if state.status == ConnectionState::Destroyed {
            if let Ok((connection, _)) = &result {
                connection.shutdown();
            }
            return Err(Arc::new(Error::Destroyed));
        }

        match result {
            Ok((connection, hello)) => {
                let tick = hello.tick_interval_ms().map(Duration::from_millis);
                info!(
                    url = %self.config.url(),
                    protocol = hello.protocol,
                    "Connected to gateway"
                );

                state.status = ConnectionState::Connected;
                state.backoff.reset();
                state.epoch += 1;
                state.connection = Some(connection.clone());
                state.hello = Some(Arc::new(hello));

                tokio::spawn(Self::monitor(
                    Arc::downgrade(&self),
                    connection,
                    state.epoch,
                    tick,
                ));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Connect attempt failed");
                state.status = ConnectionState::Disconnected;
                state.connection = None;
                self.schedule_reconnect(&mut state);
                Err(Arc::new(e))
            }
        }
    }

    /// Opens and authenticates a socket, falling back to device-less
    /// auth once if enabled.
    async fn connect_once(&self) -> Result<(Connection, HelloOk)> {
        let (identity, instance_id) = self.load_identity().await?;

        match self.open_and_handshake(Some(&identity), &instance_id).await {
            Ok(connected) => Ok(connected),
            Err(e) if self.config.deviceless_fallback() => {
                warn!(error = %e, "Connect failed, retrying without device identity");
                self.open_and_handshake(None, &instance_id).await
            }
            Err(e) => Err(e),
        }
    }

    /// Reads the identity files off the async runtime on first use.
    ///
    /// Later attempts reuse the loaded pair, so an identity that could not
    /// be persisted stays stable across reconnects.
    async fn load_identity(&self) -> Result<(DeviceIdentity, String)> {
        if let Some(loaded) = self.identity.lock().as_ref() {
            return Ok(loaded.clone());
        }

        let store = self.store.clone();
        let loaded =
            tokio::task::spawn_blocking(move || (store.load_or_create(), store.installation_id()))
                .await
                .map_err(|e| Error::identity(format!("Identity task failed: {e}")))?;

        Ok(self.identity.lock().get_or_insert(loaded).clone())
    }

    async fn open_and_handshake(
        &self,
        identity: Option<&DeviceIdentity>,
        instance_id: &str,
    ) -> Result<(Connection, HelloOk)> {
        let connection = Connection::open(
            self.config.url().as_str(),
            self.config.origin(),
            self.config.open_timeout(),
            self.router.clone(),
        )
        .await?;

        let handshake = Handshake {
            config: &self.config,
            identity,
            instance_id: Some(instance_id),
        };

        match handshake.perform(&connection).await {
            Ok(hello) => Ok((connection, hello)),
            Err(e) => {
                connection.shutdown();
                Err(e)
            }
        }
    }
}

// ============================================================================
// SupervisorInner - Disconnect & Reconnect
// ============================================================================

impl SupervisorInner {
    /// Watches one established socket until it closes.
    ///
    /// With a heartbeat interval, a socket silent for two intervals is
    /// closed.
    async fn monitor(
        weak: Weak<Self>,
        connection: Connection,
        epoch: u64,
        tick: Option<Duration>,
    ) {
        if let Some(tick) = tick {
            let limit = tick * 2;
            let mut interval = tokio::time::interval(tick);

            loop {
                tokio::select! {
                    () = connection.closed() => break,
                    _ = interval.tick() => {
                        let idle = connection.idle_for();
                        if idle > limit {
                            warn!(idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX), "Gateway silent, closing socket");
                            connection.shutdown();
                            connection.closed().await;
                            break;
                        }
                    }
                }
            }
        } else {
            connection.closed().await;
        }

        if let Some(inner) = weak.upgrade() {
            inner.handle_disconnect(epoch);
        }
    }

    /// Moves a closed socket's state to `Disconnected` and schedules a
    /// reconnect.
    fn handle_disconnect(self: &Arc<Self>, epoch: u64) {
        let mut state = self.state.lock();
        if state.epoch != epoch || state.status != ConnectionState::Connected {
            return;
        }

        info!("Disconnected from gateway");
        state.status = ConnectionState::Disconnected;
        state.connection = None;
        state.hello = None;
        self.schedule_reconnect(&mut state);
    }

    /// Arms the reconnect timer unless one is pending.
    fn schedule_reconnect(self: &Arc<Self>, state: &mut SupervisorState) {
        if state.status == ConnectionState::Destroyed || state.reconnect.is_some() {
            return;
        }

        let delay = state.backoff.next_delay();
        warn!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "Scheduling reconnect");

        let weak = Arc::downgrade(self);
        state.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.reconnect_now();
            }
        }));
    }

    /// Timer body: starts an attempt if nobody else has.
    fn reconnect_now(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.reconnect = None;

        if state.status != ConnectionState::Disconnected || state.in_flight.is_some() {
            return;
        }

        debug!("Reconnecting");
        // Failures are handled inside the attempt.
        drop(self.start_attempt(&mut state));
    }
}

impl Drop for SupervisorInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(timer) = state.reconnect.take() {
            timer.abort();
        }
        if let Some(connection) = state.connection.take() {
            connection.shutdown();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::config::GatewayConfigBuilder;
    use crate::gateway::mock::{MockGateway, MockOptions};
    use serde_json::json;
    use tempfile::TempDir;

    fn supervisor(url: &str, dir: &TempDir) -> Supervisor {
        supervisor_with(url, dir, |b| b)
    }

    fn supervisor_with(
        url: &str,
        dir: &TempDir,
        tweak: impl FnOnce(GatewayConfigBuilder) -> GatewayConfigBuilder,
    ) -> Supervisor {
        let builder = GatewayConfig::builder()
            .url(url)
            .identity_dir(dir.path())
            .challenge_timeout(Duration::from_millis(500))
            .connect_timeout(Duration::from_secs(2))
            .backoff(Duration::from_millis(50), Duration::from_millis(400));
        let config = tweak(builder).build().expect("config");
        Supervisor::new(config, EventRouter::default())
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Destroyed.to_string(), "destroyed");
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let dir = TempDir::new().expect("tempdir");
        let supervisor = supervisor("ws://127.0.0.1:9", &dir);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert!(supervisor.hello().is_none());
        assert_eq!(supervisor.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_connected_single_handshake() {
        let gateway = MockGateway::start(MockOptions::default()).await;
        let dir = TempDir::new().expect("tempdir");
        let supervisor = supervisor(&gateway.url(), &dir);

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let supervisor = supervisor.clone();
                tokio::spawn(async move { supervisor.ensure_connected().await })
            })
            .collect();
        for attempt in attempts {
            attempt.await.expect("join").expect("connected");
        }

        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert_eq!(gateway.connections(), 1);
        assert_eq!(gateway.handshakes(), 1);
        assert_eq!(gateway.device_handshakes(), 1);

        // Already connected: no new socket.
        supervisor.ensure_connected().await.expect("still connected");
        assert_eq!(gateway.connections(), 1);

        let hello = supervisor.hello().expect("hello-ok");
        assert_eq!(hello.protocol, 3);
    }

    #[tokio::test]
    async fn test_identity_is_persisted_and_reused() {
        let gateway = MockGateway::start(MockOptions::default()).await;
        let dir = TempDir::new().expect("tempdir");

        let first = supervisor(&gateway.url(), &dir);
        first.ensure_connected().await.expect("connect");
        let stored = IdentityStore::new(dir.path()).load_or_create();

        let second = supervisor(&gateway.url(), &dir);
        second.ensure_connected().await.expect("connect");
        let again = IdentityStore::new(dir.path()).load_or_create();

        assert_eq!(stored.device_id(), again.device_id());
        assert_eq!(gateway.device_handshakes(), 2);
    }

    #[tokio::test]
    async fn test_unpersistable_identity_stable_across_attempts() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").expect("write file");
        let supervisor = supervisor_with("ws://127.0.0.1:9", &dir, |b| {
            b.identity_dir(file.join("identity"))
        });

        let (first, first_install) = supervisor.inner.load_identity().await.expect("load");
        let (second, second_install) = supervisor.inner.load_identity().await.expect("load");

        assert_eq!(first.device_id(), second.device_id());
        assert_eq!(first_install, second_install);
        assert!(!file.join("identity").exists());
    }

    #[tokio::test]
    async fn test_missing_challenge_still_connects() {
        let gateway = MockGateway::start(MockOptions {
            send_challenge: false,
            ..MockOptions::default()
        })
        .await;
        let dir = TempDir::new().expect("tempdir");
        let supervisor = supervisor_with(&gateway.url(), &dir, |b| {
            b.challenge_timeout(Duration::from_millis(100))
        });

        supervisor.ensure_connected().await.expect("v1 signature accepted");
        assert_eq!(gateway.device_handshakes(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_scope_fails_connect() {
        let gateway = MockGateway::start(MockOptions {
            granted_scopes: Some(vec!["operator.pairing".into()]),
            ..MockOptions::default()
        })
        .await;
        let dir = TempDir::new().expect("tempdir");
        let supervisor = supervisor(&gateway.url(), &dir);

        let err = supervisor.ensure_connected().await.expect_err("no read scope");
        assert!(err.is_handshake_error());
        match err {
            Error::ConnectFailed(inner) => {
                assert!(matches!(&*inner, Error::InsufficientScope { granted } if granted == &["operator.pairing"]));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_ne!(supervisor.state(), ConnectionState::Connected);
        supervisor.destroy();
    }

    #[tokio::test]
    async fn test_deviceless_fallback_enabled() {
        let gateway = MockGateway::start(MockOptions {
            reject_device: true,
            ..MockOptions::default()
        })
        .await;
        let dir = TempDir::new().expect("tempdir");
        let supervisor = supervisor_with(&gateway.url(), &dir, |b| b.deviceless_fallback(true));

        supervisor.ensure_connected().await.expect("fallback connects");
        assert_eq!(gateway.connections(), 2);
        assert_eq!(gateway.rejected_handshakes(), 1);
        assert_eq!(gateway.handshakes(), 1);
        assert_eq!(gateway.device_handshakes(), 0);
        assert!(supervisor.hello().expect("hello").auth.is_none());
    }

    #[tokio::test]
    async fn test_deviceless_fallback_disabled() {
        let gateway = MockGateway::start(MockOptions {
            reject_device: true,
            ..MockOptions::default()
        })
        .await;
        let dir = TempDir::new().expect("tempdir");
        let supervisor = supervisor(&gateway.url(), &dir);

        let err = supervisor.ensure_connected().await.expect_err("rejected");
        assert!(err.is_handshake_error());
        assert_eq!(gateway.connections(), 1);
        supervisor.destroy();
    }

    #[tokio::test]
    async fn test_reconnects_after_drop_and_resets_backoff() {
        let gateway = MockGateway::start(MockOptions::default()).await;
        let addr = gateway.addr();
        let dir = TempDir::new().expect("tempdir");
        let supervisor = supervisor(&gateway.url(), &dir);

        supervisor.ensure_connected().await.expect("connect");
        assert_eq!(supervisor.next_reconnect_delay(), Duration::from_millis(50));

        // Take the gateway away entirely: reconnects fail and back off.
        gateway.stop();
        drop(gateway);
        wait_for(|| supervisor.next_reconnect_delay() >= Duration::from_millis(200)).await;
        assert_ne!(supervisor.state(), ConnectionState::Connected);

        // Bring it back on the same port: the timer reconnects on its own.
        let gateway = MockGateway::start_on(addr, MockOptions::default()).await;
        wait_for(|| supervisor.state() == ConnectionState::Connected).await;
        assert_eq!(supervisor.next_reconnect_delay(), Duration::from_millis(50));
        assert!(gateway.handshakes() >= 1);
    }

    #[tokio::test]
    async fn test_silent_gateway_trips_watchdog() {
        let gateway = MockGateway::start(MockOptions {
            tick_interval_ms: Some(100),
            ..MockOptions::default()
        })
        .await;
        let dir = TempDir::new().expect("tempdir");
        let supervisor = supervisor(&gateway.url(), &dir);

        supervisor.ensure_connected().await.expect("connect");
        wait_for(|| gateway.connections() >= 2).await;
    }

    #[tokio::test]
    async fn test_pending_calls_fail_on_drop() {
        let gateway = MockGateway::start(MockOptions::default()).await;
        let dir = TempDir::new().expect("tempdir");
        let supervisor = supervisor(&gateway.url(), &dir);
        supervisor.ensure_connected().await.expect("connect");

        let calls: Vec<_> = (0..4)
            .map(|_| {
                let supervisor = supervisor.clone();
                tokio::spawn(async move {
                    supervisor
                        .call("silent", json!({}), Duration::from_secs(10))
                        .await
                })
            })
            .collect();
        wait_for(|| supervisor.pending_count() == 4).await;

        gateway.kill_all();

        for call in calls {
            let err = call.await.expect("join").expect_err("dropped");
            assert!(matches!(err, Error::ConnectionClosed));
        }
        assert_eq!(supervisor.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_destroy_is_terminal() {
        let gateway = MockGateway::start(MockOptions::default()).await;
        let dir = TempDir::new().expect("tempdir");
        let supervisor = supervisor(&gateway.url(), &dir);
        supervisor.ensure_connected().await.expect("connect");
        let _sub = supervisor.router().subscribe_all(|_| {});

        supervisor.destroy();

        assert_eq!(supervisor.state(), ConnectionState::Destroyed);
        assert_eq!(supervisor.router().global_listener_count(), 0);
        assert!(matches!(
            supervisor.ensure_connected().await,
            Err(Error::Destroyed)
        ));
        assert!(matches!(
            supervisor.call("echo", json!({}), Duration::from_secs(1)).await,
            Err(Error::Destroyed)
        ));

        wait_for(|| gateway.live_sockets() == 0).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(gateway.connections(), 1);
    }

    #[tokio::test]
    async fn test_destroy_cancels_in_flight_attempt() {
        let gateway = MockGateway::start(MockOptions {
            send_challenge: false,
            ..MockOptions::default()
        })
        .await;
        let dir = TempDir::new().expect("tempdir");
        let supervisor = supervisor_with(&gateway.url(), &dir, |b| {
            b.challenge_timeout(Duration::from_secs(3))
        });

        let pending = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.ensure_connected().await }
        });
        wait_for(|| gateway.connections() == 1).await;
        supervisor.destroy();

        let result = pending.await.expect("join");
        assert!(matches!(result, Err(Error::Destroyed)));
    }
}
