//! WebSocket hub: brokers topic requests between processes.
//!
//! Flow per socket:
//! 1. Client connects to `/v1/bus` and sends `Hello`
//! 2. Hub answers `Welcome`
//! 3. Client `Subscribe`s to the topics it serves and sends `Request`s
//!    for topics it calls; the hub routes both through one [`LocalBus`]
//! 4. On disconnect the client's topics are released

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tm_domain::config::HubConfig;
use tm_protocol::{BusFrame, ReplyError, PROTOCOL_VERSION};
use tokio::sync::{mpsc, oneshot};

use crate::local::LocalBus;
use crate::traits::{MessageBus, Payload, RawHandler, Subscription};

pub const BUS_PATH: &str = "/v1/bus";

pub struct Hub {
    core: Arc<LocalBus>,
    config: HubConfig,
    /// Sockets past the handshake.
    clients: AtomicUsize,
}

impl Hub {
    pub fn new(config: HubConfig) -> Arc<Self> {
        Arc::new(Self {
            core: Arc::new(LocalBus::new()),
            config,
            clients: AtomicUsize::new(0),
        })
    }

    /// In-process view of the hub's topic space.  Subscriptions made here
    /// are reachable by every connected client and vice versa.
    pub fn bus(&self) -> Arc<LocalBus> {
        self.core.clone()
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(BUS_PATH, get(bus_ws))
            .with_state(self.clone())
    }

    pub fn topics(&self) -> Vec<String> {
        self.core.topics()
    }

    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET /v1/bus — upgrade to WebSocket.
async fn bus_ws(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    ws.max_message_size(hub.config.max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, hub))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Peer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A connected client, as seen by the handlers that forward to it.
struct Peer {
    name: String,
    outbound: mpsc::Sender<BusFrame>,
    /// Forwarded requests awaiting the client's `Reply`.
    pending: Mutex<HashMap<u64, oneshot::Sender<Option<Payload>>>>,
    next_id: AtomicU64,
    forward_timeout: Duration,
}

impl Peer {
    /// Drop every waiter; their forwarders resolve immediately.
    fn fail_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let n = pending.len();
        pending.clear();
        n
    }
}

/// Responder registered in the hub's core on behalf of a remote client.
struct RemoteHandler {
    peer: Arc<Peer>,
    topic: String,
}

#[async_trait::async_trait]
impl RawHandler for RemoteHandler {
    async fn handle(&self, payload: Payload) -> Option<Payload> {
        let request_id = self.peer.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.peer.pending.lock().insert(request_id, tx);

        let frame = BusFrame::Request {
            request_id,
            topic: self.topic.clone(),
            payload,
            timeout_ms: self.peer.forward_timeout.as_millis() as u64,
        };
        if self.peer.outbound.send(frame).await.is_err() {
            self.peer.pending.lock().remove(&request_id);
            return None;
        }

        match tokio::time::timeout(self.peer.forward_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => None,
            Err(_) => {
                self.peer.pending.lock().remove(&request_id);
                tracing::warn!(
                    client = %self.peer.name,
                    topic = %self.topic,
                    "forwarded request timed out"
                );
                None
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let hello_timeout = Duration::from_millis(hub.config.hello_timeout_ms);
    let client_name = match tokio::time::timeout(hello_timeout, wait_for_hello(&mut ws_stream)).await {
        Ok(Some(name)) => name,
        Ok(None) => {
            tracing::warn!("client disconnected before hello");
            return;
        }
        Err(_) => {
            tracing::warn!("client did not send hello in time");
            return;
        }
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    let welcome = BusFrame::Welcome {
        session_id: session_id.clone(),
        hub_version: env!("CARGO_PKG_VERSION").to_string(),
        protocol_version: PROTOCOL_VERSION,
    };
    match welcome.encode() {
        Ok(bytes) => {
            if ws_sink.send(Message::Binary(bytes)).await.is_err() {
                tracing::warn!(client = %client_name, "failed to send welcome");
                return;
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode welcome");
            return;
        }
    }

    hub.clients.fetch_add(1, Ordering::Relaxed);
    tracing::info!(client = %client_name, session_id = %session_id, "bus client connected");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<BusFrame>(64);
    let peer = Arc::new(Peer {
        name: client_name.clone(),
        outbound: outbound_tx.clone(),
        pending: Mutex::new(HashMap::new()),
        next_id: AtomicU64::new(0),
        forward_timeout: Duration::from_millis(hub.config.forward_timeout_ms),
    });

    // Writer task: encodes outbound frames onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let bytes = match frame.encode() {
                Ok(b) => b,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode outbound frame");
                    continue;
                }
            };
            if ws_sink.send(Message::Binary(bytes)).await.is_err() {
                break;
            }
        }
    });

    let mut subscriptions: Vec<Subscription> = Vec::new();
    let core = hub.bus();

    while let Some(Ok(msg)) = ws_stream.next().await {
        let bytes = match msg {
            Message::Binary(b) => b,
            Message::Close(_) => break,
            _ => continue,
        };
        let frame = match BusFrame::decode(&bytes) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(client = %client_name, error = %e, "ignoring undecodable frame");
                continue;
            }
        };

        match frame {
            BusFrame::Subscribe { request_id, topic } => {
                let handler = Arc::new(RemoteHandler {
                    peer: peer.clone(),
                    topic: topic.clone(),
                });
                let ack = match core.subscribe(&topic, handler).await {
                    Ok(sub) => {
                        tracing::info!(client = %client_name, topic = %topic, "remote subscription");
                        subscriptions.push(sub);
                        BusFrame::Ack { request_id, ok: true, error: None }
                    }
                    Err(e) => BusFrame::Ack {
                        request_id,
                        ok: false,
                        error: Some(e.to_string()),
                    },
                };
                if outbound_tx.send(ack).await.is_err() {
                    tracing::warn!(client = %client_name, topic = %topic, "writer gone, subscribe ack dropped");
                }
            }
            BusFrame::Unsubscribe { topic } => {
                if let Some(pos) = subscriptions.iter().position(|s| s.topic == topic) {
                    let sub = subscriptions.swap_remove(pos);
                    match core.unsubscribe(&sub).await {
                        Ok(()) => tracing::info!(client = %client_name, topic = %topic, "remote unsubscribe"),
                        Err(e) => tracing::warn!(client = %client_name, topic = %topic, error = %e, "unsubscribe failed"),
                    }
                }
            }
            BusFrame::Request { request_id, topic, payload, timeout_ms } => {
                let core = core.clone();
                let tx = outbound_tx.clone();
                let client = client_name.clone();
                tokio::spawn(async move {
                    let reply = match core
                        .request(&topic, payload, Duration::from_millis(timeout_ms))
                        .await
                    {
                        Ok(p) => BusFrame::Reply { request_id, payload: Some(p), error: None },
                        Err(e) => BusFrame::Reply {
                            request_id,
                            payload: None,
                            error: Some(ReplyError::from_error(&e)),
                        },
                    };
                    if tx.send(reply).await.is_err() {
                        tracing::warn!(client = %client, topic = %topic, request_id, "client gone, reply dropped");
                    }
                });
            }
            BusFrame::Reply { request_id, payload, error } => {
                if let Some(err) = &error {
                    tracing::debug!(client = %client_name, request_id, error = %err.message, "remote responder failed");
                }
                if let Some(tx) = peer.pending.lock().remove(&request_id) {
                    let _ = tx.send(payload);
                }
            }
            BusFrame::Ping { timestamp } => {
                if outbound_tx.send(BusFrame::Pong { timestamp }).await.is_err() {
                    tracing::debug!(client = %client_name, "writer gone, pong dropped");
                }
            }
            BusFrame::Pong { .. } => {}
            other => {
                tracing::debug!(client = %client_name, frame = ?other, "unexpected frame");
            }
        }
    }

    // Cleanup: release topics, fail in-flight forwards, stop the writer.
    for sub in &subscriptions {
        if let Err(e) = core.unsubscribe(sub).await {
            tracing::warn!(client = %client_name, topic = %sub.topic, error = %e, "failed to release topic");
        }
    }
    let failed = peer.fail_pending();
    writer.abort();
    hub.clients.fetch_sub(1, Ordering::Relaxed);
    tracing::info!(
        client = %client_name,
        released_topics = subscriptions.len(),
        failed_in_flight = failed,
        "bus client disconnected"
    );
}

async fn wait_for_hello(stream: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Binary(bytes) => match BusFrame::decode(&bytes) {
                Ok(BusFrame::Hello { client_name, protocol_version }) => {
                    if protocol_version != PROTOCOL_VERSION {
                        tracing::warn!(
                            client = %client_name,
                            protocol_version,
                            expected = PROTOCOL_VERSION,
                            "protocol version mismatch"
                        );
                    }
                    return Some(client_name);
                }
                _ => continue,
            },
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}
