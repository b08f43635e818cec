use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{future, Sink, SinkExt, StreamExt};
use serde_derive::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};

use crate::envelope::Envelope;
use crate::error::Error;
use crate::shutdown::Shutdown;

pub type ConsumerId = u64;

type ConsumerSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

struct Consumer {
    sink: ConsumerSink,
    // fired when the broadcaster drops this consumer
    kick: Option<oneshot::Sender<()>>,
}

impl Consumer {
    fn kick(&mut self) {
        if let Some(kick) = self.kick.take() {
            let _ = kick.send(());
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// outgoing messages kept while the broadcast loop is behind, oldest dropped
    /// first; 0 means unbounded
    pub queue_capacity: usize,
    /// a consumer that takes longer than this to accept a message is dropped
    pub send_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8765,
            queue_capacity: 1024,
            send_timeout_ms: 1000,
        }
    }
}

impl BridgeConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub consumer: ConsumerId,
    pub text: String,
}

pub struct Bridge {
    config: BridgeConfig,
    outgoing: parking_lot::Mutex<VecDeque<String>>,
    outgoing_ready: Notify,
    dropped: AtomicU64,
    consumers: Mutex<BTreeMap<ConsumerId, Consumer>>,
    next_consumer: AtomicU64,
    incoming_tx: mpsc::UnboundedSender<Inbound>,
    incoming_rx: Mutex<mpsc::UnboundedReceiver<Inbound>>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        Self {
            config,
            outgoing: parking_lot::Mutex::new(VecDeque::new()),
            outgoing_ready: Notify::new(),
            dropped: AtomicU64::new(0),
            consumers: Mutex::new(BTreeMap::new()),
            next_consumer: AtomicU64::new(1),
            incoming_tx,
            incoming_rx: Mutex::new(incoming_rx),
        }
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Never waits, a full queue drops its oldest message
    pub fn publish(&self, envelope: &Envelope) -> Result<(), Error> {
        let text = envelope.to_json()?;
        self.publish_text(text);

        Ok(())
    }

    pub fn publish_text(&self, text: String) {
        let evicted = {
            let mut queue = self.outgoing.lock();
            let evicted = if self.config.queue_capacity > 0
                && queue.len() >= self.config.queue_capacity
            {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(text);
            evicted
        };

        if evicted.is_some() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                tracing::warn!(dropped, "outgoing queue full, dropping oldest messages");
            }
        }

        self.outgoing_ready.notify_one();
    }

    pub fn pending(&self) -> usize {
        self.outgoing.lock().len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn consumer_count(&self) -> usize {
        self.consumers.lock().await.len()
    }

    pub async fn attach<S>(&self, sink: S) -> ConsumerId
    where
        S: Sink<String, Error = Error> + Send + 'static,
    {
        self.register(sink).await.0
    }

    /// Like `attach`, the receiver resolves once the broadcaster has dropped the
    /// consumer after a failed or timed out send
    async fn register<S>(&self, sink: S) -> (ConsumerId, oneshot::Receiver<()>)
    where
        S: Sink<String, Error = Error> + Send + 'static,
    {
        let id = self.next_consumer.fetch_add(1, Ordering::Relaxed);
        let (kick, kicked) = oneshot::channel();

        self.consumers.lock().await.insert(
            id,
            Consumer {
                sink: Box::pin(sink),
                kick: Some(kick),
            },
        );

        (id, kicked)
    }

    pub async fn detach(&self, id: ConsumerId) {
        if let Some(mut consumer) = self.consumers.lock().await.remove(&id) {
            let _ = consumer.sink.close().await;
        }
    }

    pub fn push_incoming(&self, id: ConsumerId, text: String) {
        // the receiver lives as long as the bridge
        let _ = self.incoming_tx.send(Inbound { consumer: id, text });
    }

    pub async fn receive(&self) -> Option<Inbound> {
        self.incoming_rx.lock().await.recv().await
    }

    async fn next_outgoing(&self) -> String {
        loop {
            let next = self.outgoing.lock().pop_front();
            if let Some(text) = next {
                return text;
            }

            self.outgoing_ready.notified().await;
        }
    }

    async fn deliver(&self, text: &str) {
        let mut consumers = self.consumers.lock().await;
        if consumers.is_empty() {
            tracing::trace!(len = text.len(), "no consumers, message discarded");
            return;
        }

        let send_timeout = Duration::from_millis(self.config.send_timeout_ms);
        let mut failed = Vec::new();

        for (&id, consumer) in consumers.iter_mut() {
            let send = consumer.sink.send(text.to_owned());
            match tokio::time::timeout(send_timeout, send).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::info!(consumer = id, %err, "send failed, removing consumer");
                    failed.push(id);
                }
                Err(_) => {
                    tracing::warn!(consumer = id, "send timed out, removing consumer");
                    failed.push(id);
                }
            }
        }

        // a cancelled send may leave a partial frame behind, so the
        // connection itself has to go
        for id in &failed {
            if let Some(mut consumer) = consumers.remove(id) {
                consumer.kick();
            }
        }
    }

    /// Sends queued messages one at a time until shutdown, then closes every consumer
    pub async fn broadcast_loop(&self, mut shutdown: Shutdown) {
        tracing::info!("broadcast loop started");

        loop {
            let text = tokio::select! {
                text = self.next_outgoing() => text,
                _ = shutdown.wait() => break,
            };

            self.deliver(&text).await;
            tokio::task::yield_now().await;
        }

        let mut consumers = self.consumers.lock().await;
        for (_, mut consumer) in std::mem::take(&mut *consumers) {
            let _ = consumer.sink.close().await;
        }

        tracing::info!("broadcast loop finished");
    }

    pub async fn bind(&self) -> Result<TcpListener, Error> {
        Ok(TcpListener::bind(self.config.addr()).await?)
    }

    /// Serves WebSocket consumers on `listener` until shutdown
    pub async fn accept_loop(self: Arc<Self>, listener: TcpListener, shutdown: Shutdown) -> Result<(), Error> {
        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!(%addr, "websocket server listening");

        let app = Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .with_state(AcceptState {
                bridge: self,
                shutdown: shutdown.clone(),
            });

        let mut shutdown = shutdown;
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("websocket server stopped");
        Ok(())
    }

    pub async fn serve(self: Arc<Self>, shutdown: Shutdown) -> Result<(), Error> {
        let listener = self.bind().await?;

        let broadcaster = self.clone();
        let broadcast_shutdown = shutdown.clone();
        let broadcast =
            tokio::spawn(async move { broadcaster.broadcast_loop(broadcast_shutdown).await });

        let res = self.accept_loop(listener, shutdown).await;
        let _ = broadcast.await;

        res
    }

    async fn handle_socket(self: Arc<Self>, socket: WebSocket, addr: String, mut shutdown: Shutdown) {
        let (sink, mut stream) = socket.split();

        let sink = sink
            .sink_map_err(|err| Error::Transport(err.to_string()))
            .with(|text: String| future::ready(Ok::<_, Error>(Message::Text(text))));

        let (id, mut kicked) = self.register(sink).await;
        tracing::info!(consumer = id, %addr, "consumer connected");

        loop {
            let msg = tokio::select! {
                msg = stream.next() => msg,
                _ = &mut kicked => {
                    tracing::info!(consumer = id, "dropped by broadcaster, closing connection");
                    break;
                }
                _ = shutdown.wait() => break,
            };

            match msg {
                Some(Ok(Message::Text(text))) => self.push_incoming(id, text),
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(consumer = id, len = data.len(), "ignoring binary message")
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(consumer = id, %err, "receive failed");
                    break;
                }
            }
        }

        self.detach(id).await;
        tracing::info!(consumer = id, %addr, "consumer disconnected");
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

#[derive(Clone)]
struct AcceptState {
    bridge: Arc<Bridge>,
    shutdown: Shutdown,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AcceptState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        state
            .bridge
            .handle_socket(socket, addr.to_string(), state.shutdown)
    })
}
