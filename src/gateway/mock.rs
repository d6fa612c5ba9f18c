//! In-process gateway used by the end-to-end tests.
//!
//! Speaks the real wire protocol over loopback TCP: issues challenges,
//! verifies device signatures and serves a few scripted methods.
//!
//! | Method | Behavior |
//! |--------|----------|
//! | `echo` | Answers with its params |
//! | `sleep` | Waits `params.ms`, then answers with `params.value` |
//! | `silent` | Never answers |
//! | `fail` | Answers `ok = false` with code `BOOM` |
//! | `emit` | Pushes `params.event` / `params.payload`, then answers |

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use crate::identity::{derive_device_id, verify_signature};
use crate::identity::device::decode_base64;
use crate::protocol::connect::CONNECT_METHOD;
use crate::protocol::event::CONNECT_CHALLENGE;
use crate::protocol::{
    ConnectParams, DeviceAuthPayload, ErrorShape, Event, Frame, Request, Response, decode, encode,
};

/// Scripted gateway behavior.
#[derive(Debug, Clone)]
pub(crate) struct MockOptions {
    pub send_challenge: bool,
    /// Scopes reported in `hello-ok.auth`; `None` echoes the requested ones.
    pub granted_scopes: Option<Vec<String>>,
    /// Refuse any `connect` carrying a device block.
    pub reject_device: bool,
    pub tick_interval_ms: Option<u64>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            send_challenge: true,
            granted_scopes: None,
            reject_device: false,
            tick_interval_ms: None,
        }
    }
}

#[derive(Default)]
struct MockStats {
    connections: AtomicUsize,
    handshakes: AtomicUsize,
    device_handshakes: AtomicUsize,
    rejected_handshakes: AtomicUsize,
    live: Mutex<Vec<(usize, mpsc::UnboundedSender<Message>)>>,
}

pub(crate) struct MockGateway {
    addr: SocketAddr,
    stats: Arc<MockStats>,
    kill_tx: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
}

impl MockGateway {
    pub async fn start(options: MockOptions) -> Self {
        Self::start_on("127.0.0.1:0".parse().expect("addr"), options).await
    }

    pub async fn start_on(addr: SocketAddr, options: MockOptions) -> Self {
        let listener = TcpListener::bind(addr).await.expect("bind mock gateway");
        let addr = listener.local_addr().expect("local addr");
        let stats = Arc::new(MockStats::default());
        let (kill_tx, _) = broadcast::channel(4);

        let accept_task = tokio::spawn({
            let stats = Arc::clone(&stats);
            let kill_tx = kill_tx.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let id = stats.connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(
                        id,
                        stream,
                        options.clone(),
                        Arc::clone(&stats),
                        kill_tx.subscribe(),
                    ));
                }
            }
        });

        Self {
            addr,
            stats,
            kill_tx,
            accept_task,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    pub fn handshakes(&self) -> usize {
        self.stats.handshakes.load(Ordering::SeqCst)
    }

    pub fn device_handshakes(&self) -> usize {
        self.stats.device_handshakes.load(Ordering::SeqCst)
    }

    pub fn rejected_handshakes(&self) -> usize {
        self.stats.rejected_handshakes.load(Ordering::SeqCst)
    }

    pub fn live_sockets(&self) -> usize {
        self.stats.live.lock().len()
    }

    /// Closes every open socket; the listener keeps accepting.
    pub fn kill_all(&self) {
        let _ = self.kill_tx.send(());
    }

    /// Pushes an event to every open socket.
    pub fn emit(&self, event: Event) {
        let text = encode(&Frame::from(event)).expect("encode");
        for (_, tx) in self.stats.live.lock().iter() {
            let _ = tx.send(Message::Text(text.clone().into()));
        }
    }

    /// Stops accepting and closes every open socket.
    pub fn stop(&self) {
        self.accept_task.abort();
        self.kill_all();
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(
    id: usize,
    stream: TcpStream,
    options: MockOptions,
    stats: Arc<MockStats>,
    mut kill_rx: broadcast::Receiver<()>,
) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut sink, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let close = message.is_close();
            if sink.send(message).await.is_err() || close {
                break;
            }
        }
    });

    let nonce = uuid::Uuid::new_v4().to_string();
    if options.send_challenge {
        let challenge = Event::new(CONNECT_CHALLENGE, json!({"nonce": nonce, "ts": 0}));
        send(&tx, challenge.into());
    }

    let mut connected = false;
    loop {
        tokio::select! {
            message = read.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let Ok(Frame::Request(request)) = decode(&text) else {
                    continue;
                };

                if !connected {
                    let expected_nonce = options.send_challenge.then_some(nonce.as_str());
                    match handshake(&request, &options, expected_nonce, &stats) {
                        Ok(hello) => {
                            connected = true;
                            stats.live.lock().push((id, tx.clone()));
                            send(&tx, Response::success(request.id, hello).into());
                        }
                        Err(shape) => {
                            stats.rejected_handshakes.fetch_add(1, Ordering::SeqCst);
                            send(&tx, Response::failure(request.id, shape).into());
                        }
                    }
                    continue;
                }

                handle_method(request, &tx);
            }
            _ = kill_rx.recv() => break,
        }
    }

    stats.live.lock().retain(|(live_id, _)| *live_id != id);
    let _ = tx.send(Message::Close(None));
    drop(tx);
    let _ = writer.await;
}

fn send(tx: &mpsc::UnboundedSender<Message>, frame: Frame) {
    let text = encode(&frame).expect("encode");
    let _ = tx.send(Message::Text(text.into()));
}

fn handshake(
    request: &Request,
    options: &MockOptions,
    expected_nonce: Option<&str>,
    stats: &MockStats,
) -> Result<Value, ErrorShape> {
    if request.method != CONNECT_METHOD {
        return Err(ErrorShape::new("INVALID_REQUEST", "first request must be connect"));
    }
    let params: ConnectParams = request
        .params
        .clone()
        .and_then(|p| serde_json::from_value(p).ok())
        .ok_or_else(|| ErrorShape::new("INVALID_REQUEST", "bad connect params"))?;

    if let Some(device) = &params.device {
        if options.reject_device {
            return Err(ErrorShape::new("DEVICE_UNSUPPORTED", "device identity not supported"));
        }

        let public_key = decode_base64(&device.public_key)
            .map_err(|_| ErrorShape::new("INVALID_DEVICE", "bad public key"))?;
        if derive_device_id(&public_key) != device.id {
            return Err(ErrorShape::new("INVALID_DEVICE", "device id mismatch"));
        }
        if device.nonce.as_deref() != expected_nonce {
            return Err(ErrorShape::new("INVALID_DEVICE", "nonce mismatch"));
        }

        let payload = DeviceAuthPayload {
            device_id: &device.id,
            client_id: &params.client.id,
            client_mode: &params.client.mode,
            role: &params.role,
            scopes: &params.scopes,
            signed_at_ms: device.signed_at,
            token: params.auth.token.as_deref(),
            nonce: expected_nonce,
        }
        .build();
        if !verify_signature(&device.public_key, payload.as_bytes(), &device.signature) {
            return Err(ErrorShape::new("INVALID_SIGNATURE", "signature mismatch"));
        }
        stats.device_handshakes.fetch_add(1, Ordering::SeqCst);
    }

    stats.handshakes.fetch_add(1, Ordering::SeqCst);

    let scopes = options
        .granted_scopes
        .clone()
        .unwrap_or_else(|| params.scopes.clone());
    let mut hello = json!({
        "type": "hello-ok",
        "protocol": params.max_protocol,
        "server": {"version": "mock"},
        "features": {"methods": ["echo", "sleep", "silent", "fail", "emit"]},
        "snapshot": {},
        "policy": {"maxPayload": 1_048_576},
    });
    if params.device.is_some() {
        hello["auth"] = json!({
            "deviceToken": "device-token",
            "role": params.role,
            "scopes": scopes,
            "issuedAtMs": 0,
        });
    }
    if let Some(tick) = options.tick_interval_ms {
        hello["policy"]["tickIntervalMs"] = json!(tick);
    }
    Ok(hello)
}

fn handle_method(request: Request, tx: &mpsc::UnboundedSender<Message>) {
    let params = request.params.clone().unwrap_or(Value::Null);

    match request.method.as_str() {
        "echo" => send(tx, Response::success(request.id, params).into()),
        "sleep" => {
            let tx = tx.clone();
            let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);
            let value = params.get("value").cloned().unwrap_or(Value::Null);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                send(&tx, Response::success(request.id, value).into());
            });
        }
        "silent" => {}
        "fail" => {
            let shape = ErrorShape {
                details: Some(json!({"hint": "scripted"})),
                ..ErrorShape::new("BOOM", "scripted failure")
            };
            send(tx, Response::failure(request.id, shape).into());
        }
        "emit" => {
            let name = params.get("event").and_then(Value::as_str).unwrap_or("chat");
            let payload = params.get("payload").cloned().unwrap_or(Value::Null);
            send(tx, Event::new(name, payload).into());
            send(tx, Response::success(request.id, json!({"emitted": true})).into());
        }
        other => {
            let shape = ErrorShape::new("METHOD_NOT_FOUND", format!("unknown method {other}"));
            send(tx, Response::failure(request.id, shape).into());
        }
    }
}
