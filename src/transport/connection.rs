//! WebSocket connection and event loop.
//!
//! This module handles one socket to the gateway, including
//! request/response correlation and event routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming frames from the gateway (responses, events)
//! - Outgoing requests from the Rust API
//! - Hand-off of the `connect.challenge` nonce to the handshake
//! - Failing every pending call when the socket goes away
//!
//! All inbound frames are processed one at a time on that task, so the
//! correlator and router never see two messages concurrently.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Event, Frame, Request, decode, encode};
use crate::router::EventRouter;

use super::correlator::Correlator;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for a single call (calls may cross slow agent runs).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for opening the socket.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a request whose response channel is already registered.
    Send(Request),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// One WebSocket connection to the gateway.
///
/// Handles request/response correlation and event routing.
/// The connection spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and cheap to clone; clones share the
/// same socket.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Pending calls (shared with event loop).
    correlator: Correlator,
    /// Challenge nonce receiver, taken once by the handshake.
    challenge: Arc<Mutex<Option<oneshot::Receiver<String>>>>,
    /// Flips to `true` when the event loop exits.
    closed: watch::Receiver<bool>,
    /// Time the last inbound message arrived.
    last_inbound: Arc<Mutex<Instant>>,
}

impl Connection {
    /// Opens a socket to `url` and starts its event loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `origin` is not a valid header value
    /// - [`Error::ConnectionTimeout`] if the socket does not open in time
    /// - [`Error::WebSocket`] if the upgrade fails
    pub async fn open(
        url: &str,
        origin: Option<&str>,
        open_timeout: Duration,
        router: EventRouter,
    ) -> Result<Self> {
        let mut request = url.into_client_request()?;
        if let Some(origin) = origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|e| Error::config(format!("Invalid origin header: {e}")))?;
            request.headers_mut().insert(ORIGIN, value);
        }

        let (ws_stream, response) = timeout(open_timeout, connect_async(request))
            .await
            .map_err(|_| {
                Error::connection_timeout(u64::try_from(open_timeout.as_millis()).unwrap_or(u64::MAX))
            })??;

        debug!(url, status = %response.status(), "WebSocket connected");

        Ok(Self::new(ws_stream, router))
    }

    /// Wraps an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub fn new<S>(ws_stream: WebSocketStream<S>, router: EventRouter) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (challenge_tx, challenge_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let correlator = Correlator::new();
        let last_inbound = Arc::new(Mutex::new(Instant::now()));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            EventLoopContext {
                correlator: correlator.clone(),
                router,
                challenge_tx: Some(challenge_tx),
                last_seq: None,
                last_inbound: Arc::clone(&last_inbound),
            },
            closed_tx,
        ));

        Self {
            command_tx,
            correlator,
            challenge: Arc::new(Mutex::new(Some(challenge_rx))),
            closed: closed_rx,
            last_inbound,
        }
    }
}

// ============================================================================
// Connection - Public API
// ============================================================================

impl Connection {
    /// Waits for the gateway's `connect.challenge` nonce.
    ///
    /// Returns `None` if no challenge arrives within `wait`, the socket
    /// closes first, or the challenge was already consumed.
    pub async fn wait_challenge(&self, wait: Duration) -> Option<String> {
        let rx = self.challenge.lock().take()?;

        match timeout(wait, rx).await {
            Ok(Ok(nonce)) => {
                trace!("Challenge received");
                Some(nonce)
            }
            Ok(Err(_)) => None,
            Err(_) => {
                debug!(wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX), "No challenge received");
                None
            }
        }
    }

    /// Sends a request and waits for its payload with default timeout (30s).
    ///
    /// # Errors
    ///
    /// See [`Connection::call_with_timeout`].
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.call_with_timeout(method, params, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    /// Sends a request and waits for its payload with custom timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the socket is or becomes closed
    /// - [`Error::RequestTimeout`] if no response arrives within timeout
    /// - [`Error::Rpc`] if the gateway answers `ok = false`
    /// - [`Error::Protocol`] if too many calls are pending
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        request_timeout: Duration,
    ) -> Result<Value> {
        let request = Request::new(method, params);
        let request_id = request.id;

        let response_rx = self.correlator.register(request_id)?;

        if self
            .command_tx
            .send(ConnectionCommand::Send(request))
            .is_err()
        {
            self.correlator.remove(&request_id);
            return Err(Error::ConnectionClosed);
        }

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result?.into_result(),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.correlator.remove(&request_id);
                debug!(%request_id, method, "Request timed out");

                Err(Error::request_timeout(
                    request_id,
                    u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX),
                ))
            }
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlator.len()
    }

    /// Returns the pending-call map.
    #[inline]
    #[must_use]
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Returns how long the socket has been silent.
    #[inline]
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_inbound.lock().elapsed()
    }

    /// Returns `true` once the event loop has exited.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves when the event loop has exited.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Closes the socket.
    ///
    /// Pending calls fail with [`Error::ConnectionClosed`].
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }
}

// ============================================================================
// Connection - Event Loop
// ============================================================================

/// State owned by the event loop task.
struct EventLoopContext {
    correlator: Correlator,
    router: EventRouter,
    challenge_tx: Option<oneshot::Sender<String>>,
    last_seq: Option<u64>,
    last_inbound: Arc<Mutex<Instant>>,
}

impl Connection {
    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        mut ctx: EventLoopContext,
        closed_tx: watch::Sender<bool>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the gateway
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            *ctx.last_inbound.lock() = Instant::now();
                            Self::handle_incoming_message(&text, &mut ctx);
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Binary, Ping, Pong: liveness only
                        Some(Ok(_)) => {
                            *ctx.last_inbound.lock() = Instant::now();
                        }
                    }
                }

                // Commands from Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(request)) => {
                            Self::handle_send_command(request, &mut ws_write, &ctx.correlator).await;
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("All connection handles dropped");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        // Refuse new sends before failing what is pending, so no caller
        // can slip a request in after the drain.
        command_rx.close();
        ctx.correlator.fail_all();
        let _ = closed_tx.send(true);

        debug!("Event loop terminated");
    }

    /// Handles an incoming text message from the gateway.
    fn handle_incoming_message(text: &str, ctx: &mut EventLoopContext) {
        match decode(text) {
            Ok(Frame::Response(response)) => {
                trace!(id = %response.id, ok = response.ok, "Response received");
                ctx.correlator.resolve(response);
            }

            Ok(Frame::Event(event)) if event.is_challenge() => match ctx.challenge_tx.take() {
                Some(tx) => {
                    let _ = tx.send(event.get_string("nonce"));
                }
                None => debug!("Ignoring repeated connect challenge"),
            },

            Ok(Frame::Event(event)) => {
                Self::track_sequence(&event, &mut ctx.last_seq);
                ctx.router.dispatch(event);
            }

            Ok(Frame::Request(request)) => {
                debug!(method = %request.method, "Ignoring request from gateway");
            }

            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping malformed frame");
            }
        }
    }

    /// Logs a gap in the gateway's event sequence.
    fn track_sequence(event: &Event, last_seq: &mut Option<u64>) {
        let Some(seq) = event.seq else {
            return;
        };

        if let Some(expected) = last_seq.and_then(|last| last.checked_add(1))
            && seq > expected
        {
            warn!(expected, received = seq, "Event sequence gap");
        }
        *last_seq = Some(seq);
    }

    /// Handles a send command from the Rust API.
    async fn handle_send_command<S>(
        request: Request,
        ws_write: &mut SplitSink<WebSocketStream<S>, Message>,
        correlator: &Correlator,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request_id = request.id;
        let method = request.method.clone();

        let json = match encode(&Frame::Request(request)) {
            Ok(json) => json,
            Err(e) => {
                correlator.reject(&request_id, e);
                return;
            }
        };

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            correlator.reject(&request_id, Error::connection(e.to_string()));
            return;
        }

        trace!(%request_id, %method, "Request sent");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Response;
    use crate::protocol::event::CONNECT_CHALLENGE;
    use serde_json::json;
    use tokio::io::{DuplexStream, duplex};
    use tokio_tungstenite::tungstenite::protocol::Role;

    type Server = WebSocketStream<DuplexStream>;

    async fn pair(router: EventRouter) -> (Connection, Server) {
        let (client_io, server_io) = duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        (Connection::new(client, router), server)
    }

    async fn next_request(server: &mut Server) -> Request {
        loop {
            match server.next().await {
                Some(Ok(Message::Text(text))) => match decode(&text).expect("frame") {
                    Frame::Request(request) => return request,
                    other => panic!("unexpected frame {other:?}"),
                },
                Some(Ok(_)) => continue,
                other => panic!("server stream ended: {other:?}"),
            }
        }
    }

    async fn send_frame(server: &mut Server, frame: Frame) {
        let text = encode(&frame).expect("encode");
        server.send(Message::Text(text.into())).await.expect("send");
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_REQUEST_TIMEOUT.as_secs(), 30);
        assert_eq!(DEFAULT_OPEN_TIMEOUT.as_secs(), 10);
    }

    #[tokio::test]
    async fn test_call_resolves_payload() {
        let (connection, mut server) = pair(EventRouter::default()).await;

        let call = tokio::spawn({
            let connection = connection.clone();
            async move { connection.call("status", json!({"verbose": true})).await }
        });

        let request = next_request(&mut server).await;
        assert_eq!(request.method, "status");
        assert_eq!(request.params, Some(json!({"verbose": true})));
        send_frame(&mut server, Response::success(request.id, json!({"up": true})).into()).await;

        let payload = call.await.expect("join").expect("call");
        assert_eq!(payload, json!({"up": true}));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_responses_match_by_id() {
        let (connection, mut server) = pair(EventRouter::default()).await;

        let calls: Vec<_> = (0..5)
            .map(|n| {
                let connection = connection.clone();
                tokio::spawn(async move { connection.call("echo", json!({"n": n})).await })
            })
            .collect();

        let mut requests = Vec::new();
        for _ in 0..5 {
            requests.push(next_request(&mut server).await);
        }
        for request in requests.into_iter().rev() {
            let params = request.params.clone().unwrap_or_default();
            send_frame(&mut server, Response::success(request.id, params).into()).await;
        }

        for (n, call) in calls.into_iter().enumerate() {
            let payload = call.await.expect("join").expect("call");
            assert_eq!(payload, json!({"n": n}));
        }
    }

    #[tokio::test]
    async fn test_error_response_is_rpc_error() {
        let (connection, mut server) = pair(EventRouter::default()).await;

        let call = tokio::spawn({
            let connection = connection.clone();
            async move { connection.call("sessions.reset", json!({})).await }
        });

        let request = next_request(&mut server).await;
        let shape = crate::protocol::ErrorShape::new("INVALID_REQUEST", "unknown session");
        send_frame(&mut server, Response::failure(request.id, shape).into()).await;

        let err = call.await.expect("join").expect_err("must fail");
        assert_eq!(err.rpc_code(), Some("INVALID_REQUEST"));
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry() {
        let (connection, mut server) = pair(EventRouter::default()).await;

        let call = tokio::spawn({
            let connection = connection.clone();
            async move {
                connection
                    .call_with_timeout("ping", json!({}), Duration::from_millis(200))
                    .await
            }
        });

        let request = next_request(&mut server).await;
        let err = call.await.expect("join").expect_err("must time out");

        assert!(matches!(err, Error::RequestTimeout { request_id, timeout_ms: 200 } if request_id == request.id));
        assert!(!connection.correlator().contains(&request.id));
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn test_close_fails_all_pending() {
        let (connection, mut server) = pair(EventRouter::default()).await;

        let calls: Vec<_> = (0..3)
            .map(|_| {
                let connection = connection.clone();
                tokio::spawn(async move { connection.call("slow", json!({})).await })
            })
            .collect();

        for _ in 0..3 {
            next_request(&mut server).await;
        }
        assert_eq!(connection.pending_count(), 3);

        server.close(None).await.expect("close");
        drop(server);

        for call in calls {
            let err = call.await.expect("join").expect_err("must fail");
            assert!(matches!(err, Error::ConnectionClosed));
        }
        connection.closed().await;
        assert!(connection.is_closed());
        assert_eq!(connection.pending_count(), 0);

        let err = connection.call("late", json!({})).await.expect_err("closed");
        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_events_routed_and_malformed_dropped() {
        let router = EventRouter::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = router.subscribe_all(move |event: &Event| sink.lock().push(event.event.clone()));

        let (connection, mut server) = pair(router).await;

        server
            .send(Message::Text("{garbage".into()))
            .await
            .expect("send");
        send_frame(&mut server, Event::new("chat", json!({"sessionKey": "abc"})).into()).await;

        // A round trip guarantees both frames above were processed.
        let call = tokio::spawn({
            let connection = connection.clone();
            async move { connection.call("health", Value::Null).await }
        });
        let request = next_request(&mut server).await;
        assert_eq!(request.params, None);
        send_frame(&mut server, Response::success(request.id, json!({})).into()).await;
        call.await.expect("join").expect("call");

        assert_eq!(*seen.lock(), vec!["chat".to_string()]);
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn test_challenge_handed_to_handshake_not_router() {
        let router = EventRouter::default();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let _sub = router.subscribe_all(move |_: &Event| *sink.lock() += 1);

        let (connection, mut server) = pair(router).await;
        send_frame(
            &mut server,
            Event::new(CONNECT_CHALLENGE, json!({"nonce": "n-42", "ts": 1})).into(),
        )
        .await;

        let nonce = connection.wait_challenge(Duration::from_secs(2)).await;
        assert_eq!(nonce.as_deref(), Some("n-42"));
        assert_eq!(*seen.lock(), 0);

        // Consumed once.
        assert_eq!(connection.wait_challenge(Duration::from_millis(10)).await, None);
    }

    #[tokio::test]
    async fn test_missing_challenge_times_out() {
        let (connection, _server) = pair(EventRouter::default()).await;
        let nonce = connection.wait_challenge(Duration::from_millis(50)).await;
        assert_eq!(nonce, None);
    }

    #[tokio::test]
    async fn test_shutdown_closes() {
        let (connection, mut server) = pair(EventRouter::default()).await;
        connection.shutdown();
        connection.closed().await;
        assert!(connection.is_closed());

        // The server side sees the close frame.
        let message = server.next().await;
        assert!(matches!(message, Some(Ok(Message::Close(_))) | None));
    }

    #[test]
    fn test_track_sequence() {
        let mut last = None;
        Connection::track_sequence(&Event::new("a", json!({})).with_seq(1), &mut last);
        assert_eq!(last, Some(1));
        Connection::track_sequence(&Event::new("b", json!({})).with_seq(5), &mut last);
        assert_eq!(last, Some(5));
        Connection::track_sequence(&Event::new("c", json!({})), &mut last);
        assert_eq!(last, Some(5));
        Connection::track_sequence(&Event::new("d", json!({})).with_seq(u64::MAX), &mut last);
        assert_eq!(last, Some(u64::MAX));
        Connection::track_sequence(&Event::new("e", json!({})).with_seq(1), &mut last);
        assert_eq!(last, Some(1));
    }

    #[tokio::test]
    async fn test_max_sequence_keeps_loop_alive() {
        let (connection, mut server) = pair(EventRouter::default()).await;

        send_frame(&mut server, Event::new("tick", json!({})).with_seq(u64::MAX).into()).await;
        send_frame(&mut server, Event::new("tick", json!({})).with_seq(1).into()).await;

        let call = tokio::spawn({
            let connection = connection.clone();
            async move { connection.call("health", Value::Null).await }
        });
        let request = next_request(&mut server).await;
        send_frame(&mut server, Response::success(request.id, json!({"ok": true})).into()).await;

        let payload = call.await.expect("join").expect("call");
        assert_eq!(payload, json!({"ok": true}));
        assert!(!connection.is_closed());
    }
}
