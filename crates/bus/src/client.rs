//! [`MessageBus`] over a WebSocket connection to a [`Hub`](crate::hub::Hub).
//!
//! The client keeps its own table of local responders.  After a dropped
//! connection it re-dials with [`ReconnectBackoff`] and re-announces every
//! topic it serves.  Requests issued while disconnected fail immediately.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::SplitStream;
use futures_util::{FutureExt, SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tm_domain::config::BusConfig;
use tm_domain::{Error, Result};
use tm_protocol::{BusFrame, ReplyError, ReplyErrorKind, PROTOCOL_VERSION};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::reconnect::ReconnectBackoff;
use crate::traits::{MessageBus, Payload, RawHandler, Subscription};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const ACK_TIMEOUT: Duration = Duration::from_secs(5);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Aborts the wrapped task when dropped, on every exit path of its owner.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct LocalRoute {
    id: u64,
    handler: Arc<dyn RawHandler>,
}

struct Inner {
    url: String,
    client_name: String,
    backoff: ReconnectBackoff,
    /// Sender for the live connection's writer task, `None` while down.
    outbound: Mutex<Option<mpsc::Sender<BusFrame>>>,
    /// Our own requests awaiting a `Reply`.
    pending: Mutex<HashMap<u64, oneshot::Sender<BusFrame>>>,
    /// Our `Subscribe`s awaiting an `Ack`.
    acks: Mutex<HashMap<u64, oneshot::Sender<std::result::Result<(), String>>>>,
    routes: RwLock<HashMap<String, LocalRoute>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    /// Writer task of the live connection; it sends the websocket Close.
    writer: Mutex<Option<JoinHandle<()>>>,
}

pub struct WsBus {
    inner: Arc<Inner>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl WsBus {
    /// Dial the hub, complete the handshake, and start the connection
    /// supervisor.  Fails if the first connection cannot be established.
    pub async fn connect(config: &BusConfig) -> Result<Arc<Self>> {
        let inner = Arc::new(Inner {
            url: config.url.clone(),
            client_name: config.client_name.clone(),
            backoff: ReconnectBackoff::from(&config.reconnect),
            outbound: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            acks: Mutex::new(HashMap::new()),
            routes: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            writer: Mutex::new(None),
        });

        let stream = inner.open().await?;
        let supervisor = tokio::spawn(supervise(inner.clone(), stream));

        Ok(Arc::new(Self {
            inner,
            supervisor: Mutex::new(Some(supervisor)),
        }))
    }

    pub fn is_connected(&self) -> bool {
        self.inner.outbound.lock().is_some()
    }
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn sender(&self) -> Result<mpsc::Sender<BusFrame>> {
        self.outbound
            .lock()
            .clone()
            .ok_or_else(|| Error::Bus("not connected to hub".into()))
    }

    /// Connect + handshake.  Installs the writer and returns the read half.
    async fn open(&self) -> Result<SplitStream<WsStream>> {
        tracing::info!(url = %self.url, client = %self.client_name, "connecting to hub");
        let (ws, _response) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| Error::Bus(format!("connect {}: {e}", self.url)))?;
        let (mut sink, mut stream) = ws.split();

        let hello = BusFrame::Hello {
            client_name: self.client_name.clone(),
            protocol_version: PROTOCOL_VERSION,
        };
        sink.send(Message::Binary(hello.encode()?))
            .await
            .map_err(|e| Error::Bus(format!("send hello: {e}")))?;

        let welcome = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Binary(bytes) = msg {
                    if let Ok(BusFrame::Welcome { session_id, hub_version, .. }) =
                        BusFrame::decode(&bytes)
                    {
                        return Ok((session_id, hub_version));
                    }
                }
            }
            Err(Error::Bus("connection closed before welcome".into()))
        })
        .await
        .map_err(|_| Error::Timeout("hub welcome".into()))??;

        tracing::info!(
            client = %self.client_name,
            session_id = %welcome.0,
            hub_version = %welcome.1,
            "hub welcomed us"
        );

        let (tx, mut rx) = mpsc::channel::<BusFrame>(64);
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let bytes = match frame.encode() {
                    Ok(b) => b,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode outbound frame");
                        continue;
                    }
                };
                if sink.send(Message::Binary(bytes)).await.is_err() {
                    break;
                }
            }
            if let Err(e) = sink.send(Message::Close(None)).await {
                tracing::debug!(error = %e, "hub socket already gone");
            }
        });
        *self.outbound.lock() = Some(tx);
        *self.writer.lock() = Some(writer);

        Ok(stream)
    }

    /// Re-announce every local topic on a fresh connection.
    async fn resubscribe(&self) {
        let topics: Vec<String> = self.routes.read().keys().cloned().collect();
        let Ok(tx) = self.sender() else { return };
        for topic in topics {
            let frame = BusFrame::Subscribe { request_id: self.next_id(), topic };
            if tx.send(frame).await.is_err() {
                break;
            }
        }
    }

    /// Tear down per-connection state after the socket closed.
    fn disconnected(&self) {
        *self.outbound.lock() = None;
        // Dropping the senders wakes every waiter with a closed channel.
        self.pending.lock().clear();
        self.acks.lock().clear();
    }

    async fn read_loop(self: &Arc<Self>, mut stream: SplitStream<WsStream>) {
        let _heartbeat = self.sender().ok().map(|tx| {
            AbortOnDrop(tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
                loop {
                    interval.tick().await;
                    let ping = BusFrame::Ping { timestamp: Utc::now().timestamp_millis() };
                    if tx.send(ping).await.is_err() {
                        break;
                    }
                }
            }))
        });

        while let Some(Ok(msg)) = stream.next().await {
            let bytes = match msg {
                Message::Binary(b) => b,
                Message::Close(_) => break,
                _ => continue,
            };
            match BusFrame::decode(&bytes) {
                Ok(frame) => self.dispatch(frame).await,
                Err(e) => tracing::debug!(error = %e, "ignoring undecodable frame"),
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, frame: BusFrame) {
        match frame {
            BusFrame::Reply { request_id, .. } => {
                if let Some(tx) = self.pending.lock().remove(&request_id) {
                    let _ = tx.send(frame);
                }
            }
            BusFrame::Ack { request_id, ok, error } => {
                let waiter = self.acks.lock().remove(&request_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(if ok { Ok(()) } else { Err(error.unwrap_or_default()) });
                    }
                    None if !ok => {
                        tracing::warn!(error = ?error, "hub refused a re-subscription");
                    }
                    None => {}
                }
            }
            BusFrame::Request { request_id, topic, payload, .. } => {
                let handler = self.routes.read().get(&topic).map(|r| r.handler.clone());
                let Ok(tx) = self.sender() else { return };
                tokio::spawn(async move {
                    let reply = match handler {
                        Some(h) => match AssertUnwindSafe(h.handle(payload)).catch_unwind().await {
                            // `None` payload with no error: responder chose not to answer.
                            Ok(payload) => BusFrame::Reply { request_id, payload, error: None },
                            Err(_panic) => {
                                tracing::error!(topic = %topic, "local responder panicked");
                                BusFrame::Reply {
                                    request_id,
                                    payload: None,
                                    error: Some(ReplyError {
                                        kind: ReplyErrorKind::Bus,
                                        message: format!("{topic}: responder panicked"),
                                    }),
                                }
                            }
                        },
                        None => BusFrame::Reply {
                            request_id,
                            payload: None,
                            error: Some(ReplyError {
                                kind: ReplyErrorKind::NoResponders,
                                message: topic,
                            }),
                        },
                    };
                    let _ = tx.send(reply).await;
                });
            }
            BusFrame::Ping { timestamp } => {
                if let Ok(tx) = self.sender() {
                    let _ = tx.send(BusFrame::Pong { timestamp }).await;
                }
            }
            BusFrame::Pong { .. } => tracing::trace!("received pong"),
            other => tracing::debug!(frame = ?other, "unexpected frame"),
        }
    }
}

/// Connection supervisor: read until the socket drops, then re-dial.
async fn supervise(inner: Arc<Inner>, first: SplitStream<WsStream>) {
    let mut stream = Some(first);
    let mut attempt: u32 = 0;

    loop {
        if let Some(s) = stream.take() {
            tokio::select! {
                _ = inner.read_loop(s) => {}
                _ = inner.shutdown.cancelled() => {
                    inner.disconnected();
                    return;
                }
            }
            inner.disconnected();
            tracing::warn!(client = %inner.client_name, "hub connection lost");
        }

        if inner.backoff.exhausted(attempt) {
            tracing::error!(client = %inner.client_name, attempts = attempt, "giving up on hub");
            return;
        }
        let delay = inner.backoff.delay_for_attempt(attempt);
        tracing::info!(
            client = %inner.client_name,
            delay_ms = delay.as_millis() as u64,
            attempt = attempt + 1,
            "reconnecting"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = inner.shutdown.cancelled() => return,
        }

        match inner.open().await {
            Ok(s) => {
                attempt = 0;
                inner.resubscribe().await;
                stream = Some(s);
            }
            Err(e) => {
                tracing::warn!(client = %inner.client_name, error = %e, "reconnect failed");
                attempt += 1;
            }
        }
    }
}

#[async_trait::async_trait]
impl MessageBus for WsBus {
    async fn request(&self, topic: &str, payload: Payload, timeout: Duration) -> Result<Payload> {
        let tx = self.inner.sender()?;
        let request_id = self.inner.next_id();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner.pending.lock().insert(request_id, reply_tx);

        let frame = BusFrame::Request {
            request_id,
            topic: topic.to_string(),
            payload,
            timeout_ms: timeout.as_millis() as u64,
        };
        if tx.send(frame).await.is_err() {
            self.inner.pending.lock().remove(&request_id);
            return Err(Error::Bus("hub connection closed".into()));
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(BusFrame::Reply { error: Some(e), .. })) => Err(e.into_error()),
            Ok(Ok(BusFrame::Reply { payload: Some(p), .. })) => Ok(p),
            Ok(Ok(_)) => Err(Error::Timeout(format!("{topic}: responder sent no reply"))),
            Ok(Err(_)) => Err(Error::Bus("hub connection lost".into())),
            Err(_) => {
                self.inner.pending.lock().remove(&request_id);
                Err(Error::Timeout(format!(
                    "{topic}: no reply within {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn RawHandler>) -> Result<Subscription> {
        let id = self.inner.next_id();
        {
            let mut routes = self.inner.routes.write();
            if routes.contains_key(topic) {
                return Err(Error::Subscribe {
                    topic: topic.to_string(),
                    message: "topic already has a local responder".into(),
                });
            }
            routes.insert(topic.to_string(), LocalRoute { id, handler });
        }

        let outcome = self.announce(topic, id).await;
        if let Err(e) = outcome {
            let mut routes = self.inner.routes.write();
            if routes.get(topic).is_some_and(|r| r.id == id) {
                routes.remove(topic);
            }
            return Err(e);
        }
        Ok(Subscription { topic: topic.to_string(), id })
    }

    async fn unsubscribe(&self, sub: &Subscription) -> Result<()> {
        let removed = {
            let mut routes = self.inner.routes.write();
            if routes.get(&sub.topic).is_some_and(|r| r.id == sub.id) {
                routes.remove(&sub.topic);
                true
            } else {
                false
            }
        };
        if removed {
            if let Ok(tx) = self.inner.sender() {
                let _ = tx.send(BusFrame::Unsubscribe { topic: sub.topic.clone() }).await;
            }
        }
        Ok(())
    }

    /// Release every held topic, then close the socket.  The writer drains
    /// the queued `Unsubscribe` frames before it sends the websocket Close.
    async fn close(&self) -> Result<()> {
        let topics: Vec<String> = self.inner.routes.write().drain().map(|(t, _)| t).collect();
        if let Ok(tx) = self.inner.sender() {
            for topic in topics {
                if tx.send(BusFrame::Unsubscribe { topic: topic.clone() }).await.is_err() {
                    tracing::debug!(topic = %topic, "hub connection gone before unsubscribe");
                    break;
                }
            }
        }

        self.inner.shutdown.cancel();
        let supervisor = self.supervisor.lock().take();
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                tracing::warn!(client = %self.inner.client_name, error = %e, "supervisor task failed");
            }
        }

        let writer = self.inner.writer.lock().take();
        if let Some(handle) = writer {
            if tokio::time::timeout(FLUSH_TIMEOUT, handle).await.is_err() {
                tracing::warn!(client = %self.inner.client_name, "writer did not flush before close");
            }
        }
        tracing::info!(client = %self.inner.client_name, "bus closed");
        Ok(())
    }
}

impl WsBus {
    /// Send `Subscribe` and wait for the hub's verdict.
    async fn announce(&self, topic: &str, request_id: u64) -> Result<()> {
        let tx = self.inner.sender()?;
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inner.acks.lock().insert(request_id, ack_tx);

        let frame = BusFrame::Subscribe { request_id, topic: topic.to_string() };
        if tx.send(frame).await.is_err() {
            self.inner.acks.lock().remove(&request_id);
            return Err(Error::Bus("hub connection closed".into()));
        }

        match tokio::time::timeout(ACK_TIMEOUT, ack_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(Error::Subscribe { topic: topic.to_string(), message }),
            Ok(Err(_)) => Err(Error::Bus("hub connection lost".into())),
            Err(_) => {
                self.inner.acks.lock().remove(&request_id);
                Err(Error::Timeout(format!("subscribe {topic}")))
            }
        }
    }
}

impl Drop for WsBus {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
