//! WebSocket session lifecycle.
//!
//! One [`Client`] drives one authenticated feed connection: token
//! acquisition, dial, the subscription ledger, heartbeat, the bounded read
//! queue feeding the worker pool, reconnection under the fixed backoff
//! schedule, and in-order shutdown. The session is the fault domain —
//! transport errors never cross the worker boundary; a reconnect restores
//! the stream and replays the ledger before the session reports ready.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message, WebSocketConfig};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dispatch::{
    self, equities_worker_count, options_worker_count, read_queue, ReadQueue, ReadQueueReceiver,
    MAX_EQUITIES_QUEUE_DEPTH, MAX_OPTIONS_QUEUE_DEPTH,
};
use crate::equities::{self, EquityHandlers};
use crate::errors::{Error, Result};
use crate::options::{self, OptionsHandlers};
use crate::req::{HttpClient, CLIENT_INFORMATION};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
const TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);
const WRITE_QUEUE_DEPTH: usize = 1_000;
const WRITE_BUFFER_SIZE: usize = 128;
const CLOSE_DEADLINE: Duration = Duration::from_secs(2);

/// Firehose channel name; subscribes to the feed's full universe.
pub const FIREHOSE_CHANNEL: &str = "$FIREHOSE";

/// Fixed reconnect/reauth schedule, seconds. The index advances on each
/// consecutive failure and saturates at the last entry.
const SELF_HEAL_BACKOFFS: [u64; 5] = [10, 30, 60, 300, 600];

/// Self-healing backoff state for one failure episode.
#[derive(Debug, Default)]
pub(crate) struct BackoffSchedule {
    index: usize,
}

impl BackoffSchedule {
    pub(crate) fn new() -> Self {
        BackoffSchedule::default()
    }

    /// Delay to sleep after the current failure, advancing the schedule.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_secs(SELF_HEAL_BACKOFFS[self.index]);
        self.index = (self.index + 1).min(SELF_HEAL_BACKOFFS.len() - 1);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.index = 0;
    }
}

/// Observable session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Created = 0,
    Authenticating = 1,
    Connecting = 2,
    Streaming = 3,
    Disconnected = 4,
    Draining = 5,
    Closed = 6,
}

impl SessionState {
    fn from_u8(value: u8) -> SessionState {
        match value {
            1 => SessionState::Authenticating,
            2 => SessionState::Connecting,
            3 => SessionState::Streaming,
            4 => SessionState::Disconnected,
            5 => SessionState::Draining,
            6 => SessionState::Closed,
            _ => SessionState::Created,
        }
    }
}

/// Channel set with join/leave idempotence. Frames are composed only on
/// membership transitions.
#[derive(Default)]
pub(crate) struct SubscriptionLedger {
    channels: HashSet<String>,
}

impl SubscriptionLedger {
    pub(crate) fn join(
        &mut self,
        channel: &str,
        compose: impl Fn(&str) -> Vec<u8>,
    ) -> Option<Vec<u8>> {
        let channel = channel.trim();
        if channel.is_empty() || self.channels.contains(channel) {
            return None;
        }
        self.channels.insert(channel.to_string());
        Some(compose(channel))
    }

    pub(crate) fn leave(
        &mut self,
        channel: &str,
        compose: impl Fn(&str) -> Vec<u8>,
    ) -> Option<Vec<u8>> {
        let channel = channel.trim();
        if channel.is_empty() || !self.channels.remove(channel) {
            return None;
        }
        Some(compose(channel))
    }

    /// Leave frames for every member, emptying the ledger.
    pub(crate) fn drain_all(&mut self, compose: impl Fn(&str) -> Vec<u8>) -> Vec<Vec<u8>> {
        let frames = self.channels.iter().map(|c| compose(c)).collect();
        self.channels.clear();
        frames
    }

    /// Join frames for every member; used on reconnect before the session
    /// republishes readiness.
    pub(crate) fn rejoin_all(&self, compose: impl Fn(&str) -> Vec<u8>) -> Vec<Vec<u8>> {
        self.channels.iter().map(|c| compose(c)).collect()
    }

    pub(crate) fn contains(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }
}

struct TokenState {
    token: String,
    updated: Instant,
}

struct ClientInner {
    config: Config,
    http: HttpClient,
    feed_name: &'static str,
    token: parking_lot::Mutex<Option<TokenState>>,
    state: AtomicU8,
    stopped: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    data_msg_count: AtomicU64,
    txt_msg_count: AtomicU64,
    subscriptions: parking_lot::Mutex<SubscriptionLedger>,
    read_queue: ReadQueue,
    write_tx: mpsc::Sender<Vec<u8>>,
    compose_join: Box<dyn Fn(&str) -> Vec<u8> + Send + Sync>,
    compose_leave: Box<dyn Fn(&str) -> Vec<u8> + Send + Sync>,
}

impl ClientInner {
    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn log_stats(&self) {
        info!(
            feed = self.feed_name,
            data_msg_count = self.data_msg_count.load(Ordering::Relaxed),
            txt_msg_count = self.txt_msg_count.load(Ordering::Relaxed),
            queue_depth = self.read_queue.depth(),
            "Client - stats"
        );
    }

    async fn try_set_token(&self) -> bool {
        info!(feed = self.feed_name, "Client - Authorizing...");
        match self
            .http
            .get_text_with_headers(
                &self.config.auth_url(),
                &[("Client-Information", CLIENT_INFORMATION)],
            )
            .await
        {
            Ok(token) => {
                *self.token.lock() = Some(TokenState {
                    token,
                    updated: Instant::now(),
                });
                info!(feed = self.feed_name, "Client - Authorization successful");
                true
            }
            Err(err) => {
                warn!(feed = self.feed_name, %err, "Client - Authorization failure");
                false
            }
        }
    }

    fn cached_token(&self) -> Option<String> {
        let token = self.token.lock();
        token
            .as_ref()
            .filter(|t| t.updated.elapsed() < TOKEN_LIFETIME)
            .map(|t| t.token.clone())
    }

    /// Fresh-or-reauthorized token, retrying under the backoff schedule.
    async fn get_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }
        let mut backoff = BackoffSchedule::new();
        loop {
            if self.try_set_token().await {
                return Ok(self.cached_token().unwrap_or_default());
            }
            tokio::time::sleep(backoff.next_delay()).await;
            if self.stopped.load(Ordering::SeqCst) {
                return Err(Error::Stopped);
            }
        }
    }

    async fn dial(&self, token: &str) -> Result<WsStream> {
        info!(feed = self.feed_name, "Client - Connecting...");
        let url = self.config.websocket_url(token);
        let mut request = url.into_client_request().map_err(Error::websocket)?;
        let headers = request.headers_mut();
        headers.insert(
            "Client-Information",
            CLIENT_INFORMATION.parse().map_err(Error::websocket)?,
        );
        headers.insert(
            "UseNewEquitiesFormat",
            "v2".parse().map_err(Error::websocket)?,
        );
        let mut ws_config = WebSocketConfig::default();
        ws_config.write_buffer_size = WRITE_BUFFER_SIZE;
        let (stream, response) = connect_async_with_config(request, Some(ws_config), false)
            .await
            .map_err(Error::websocket)?;
        info!(feed = self.feed_name, status = ?response.status(), "Client - Connected");
        Ok(stream)
    }

    async fn queue_write(&self, frame: Vec<u8>) {
        if self.write_tx.send(frame).await.is_err() {
            warn!(feed = self.feed_name, "Client - write queue closed");
        }
    }

    /// Replay the ledger onto a fresh connection, then mark the session
    /// open. Joins queued by callers block on the closed flag, so readiness
    /// is published only after every rejoin frame is in the write queue.
    async fn replay_subscriptions(&self) {
        let frames = {
            let ledger = self.subscriptions.lock();
            ledger.rejoin_all(|channel| (self.compose_join)(channel))
        };
        if !frames.is_empty() {
            info!(
                feed = self.feed_name,
                channels = frames.len(),
                "Client - Rejoining"
            );
        }
        for frame in frames {
            self.queue_write(frame).await;
        }
        self.closed.store(false, Ordering::SeqCst);
        self.set_state(SessionState::Streaming);
    }

    /// Reconnect loop: reuse the cached token while it is fresh, otherwise
    /// reauthorize, then dial; sleep the schedule between failures. Returns
    /// the new read half, or `None` when stopped mid-backoff.
    async fn reconnect(self: &Arc<Self>, writer: &Arc<tokio::sync::Mutex<WsSink>>) -> Option<WsSource> {
        let mut backoff = BackoffSchedule::new();
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return None;
            }
            info!(feed = self.feed_name, "Client - Reconnecting...");
            let token = match self.cached_token() {
                Some(token) => Some(token),
                None => {
                    if self.try_set_token().await {
                        self.cached_token()
                    } else {
                        None
                    }
                }
            };
            if let Some(token) = token {
                match self.dial(&token).await {
                    Ok(stream) => {
                        let (sink, source) = stream.split();
                        *writer.lock().await = sink;
                        self.replay_subscriptions().await;
                        info!(feed = self.feed_name, "Client - Reconnected");
                        return Some(source);
                    }
                    Err(err) => {
                        warn!(feed = self.feed_name, %err, "Client - Connection failure");
                    }
                }
            }
            tokio::time::sleep(backoff.next_delay()).await;
        }
    }
}

/// A realtime feed session. Construct with [`Client::options`] or
/// [`Client::equities`], then [`start`](Client::start), join channels, and
/// [`stop`](Client::stop) for an in-order shutdown.
pub struct Client {
    inner: Arc<ClientInner>,
    receiver: ReadQueueReceiver,
    write_rx: parking_lot::Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    work: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
    worker_count: usize,
    worker_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Client {
    /// Build an options-feed client. Handler presence selects the join mask
    /// and sizes the worker pool.
    pub fn options(config: Config, handlers: OptionsHandlers) -> Result<Client> {
        config.validate()?;
        let has_trade = handlers.on_trade.is_some();
        let has_quote = handlers.on_quote.is_some();
        let has_refresh = handlers.on_refresh.is_some();
        let has_ua = handlers.on_unusual_activity.is_some();
        let worker_count = options_worker_count(has_trade, has_quote);
        let work: Arc<dyn Fn(Vec<u8>) + Send + Sync> = Arc::new(move |payload: Vec<u8>| {
            if let Err(err) = options::work_on_options(&payload, &handlers) {
                error!(%err, "Option Client - dropping remainder of batch");
            }
        });
        let compose_join = Box::new(move |channel: &str| {
            options::compose_join_msg(has_trade, has_quote, has_refresh, has_ua, channel)
        });
        let compose_leave = Box::new(options::compose_leave_msg as fn(&str) -> Vec<u8>)
            as Box<dyn Fn(&str) -> Vec<u8> + Send + Sync>;
        Self::build(
            config,
            "options",
            MAX_OPTIONS_QUEUE_DEPTH,
            worker_count,
            work,
            compose_join,
            compose_leave,
        )
    }

    /// Build an equities-feed client.
    pub fn equities(config: Config, handlers: EquityHandlers) -> Result<Client> {
        config.validate()?;
        let has_trade = handlers.on_trade.is_some();
        let has_quote = handlers.on_quote.is_some();
        let worker_count = equities_worker_count(has_quote);
        let work: Arc<dyn Fn(Vec<u8>) + Send + Sync> = Arc::new(move |payload: Vec<u8>| {
            if let Err(err) = equities::work_on_equities(&payload, &handlers) {
                error!(%err, "Equity Client - dropping remainder of batch");
            }
        });
        let compose_join =
            Box::new(move |channel: &str| equities::compose_join_msg(has_trade, has_quote, channel));
        let compose_leave = Box::new(equities::compose_leave_msg as fn(&str) -> Vec<u8>)
            as Box<dyn Fn(&str) -> Vec<u8> + Send + Sync>;
        Self::build(
            config,
            "equities",
            MAX_EQUITIES_QUEUE_DEPTH,
            worker_count,
            work,
            compose_join,
            compose_leave,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        config: Config,
        feed_name: &'static str,
        queue_depth: usize,
        worker_count: usize,
        work: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
        compose_join: Box<dyn Fn(&str) -> Vec<u8> + Send + Sync>,
        compose_leave: Box<dyn Fn(&str) -> Vec<u8> + Send + Sync>,
    ) -> Result<Client> {
        let (queue, receiver) = read_queue(queue_depth);
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let inner = Arc::new(ClientInner {
            config,
            http: HttpClient::new(),
            feed_name,
            token: parking_lot::Mutex::new(None),
            state: AtomicU8::new(SessionState::Created as u8),
            stopped: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(true)),
            data_msg_count: AtomicU64::new(0),
            txt_msg_count: AtomicU64::new(0),
            subscriptions: parking_lot::Mutex::new(SubscriptionLedger::default()),
            read_queue: queue,
            write_tx,
            compose_join,
            compose_leave,
        });
        Ok(Client {
            inner,
            receiver,
            write_rx: parking_lot::Mutex::new(Some(write_rx)),
            work,
            worker_count,
            worker_handles: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Authenticate, dial, and launch the reader, writer, heartbeat and
    /// worker tasks. Call once.
    pub async fn start(&self) -> Result<()> {
        let write_rx = self
            .write_rx
            .lock()
            .take()
            .ok_or(Error::Stopped)?;

        self.inner.set_state(SessionState::Authenticating);
        let token = self.inner.get_token().await?;

        self.inner.set_state(SessionState::Connecting);
        let stream = self.inner.dial(&token).await?;
        let (sink, source) = stream.split();
        let writer = Arc::new(tokio::sync::Mutex::new(sink));
        self.inner.closed.store(false, Ordering::SeqCst);
        self.inner.set_state(SessionState::Streaming);

        let handles = dispatch::spawn_workers(
            self.worker_count,
            self.receiver.clone(),
            Arc::clone(&self.inner.closed),
            Arc::clone(&self.inner.stopped),
            Arc::clone(&self.work),
        );
        self.worker_handles.lock().await.extend(handles);

        tokio::spawn(run_reader(Arc::clone(&self.inner), source, Arc::clone(&writer)));
        tokio::spawn(run_writer(Arc::clone(&self.inner), write_rx, writer));
        Ok(())
    }

    async fn wait_open(&self) -> Result<()> {
        while self.inner.closed.load(Ordering::SeqCst) {
            if self.inner.stopped.load(Ordering::SeqCst) {
                return Err(Error::Stopped);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Ok(())
    }

    /// Subscribe to a channel (ticker, contract id, or [`FIREHOSE_CHANNEL`]).
    /// A no-op when already joined.
    pub async fn join(&self, channel: &str) -> Result<()> {
        if channel.trim().is_empty() {
            return Ok(());
        }
        self.wait_open().await?;
        let frame = {
            let mut ledger = self.inner.subscriptions.lock();
            ledger.join(channel, |c| (self.inner.compose_join)(c))
        };
        if let Some(frame) = frame {
            info!(feed = self.inner.feed_name, channel, "Client - joining channel");
            self.inner.queue_write(frame).await;
        }
        Ok(())
    }

    pub async fn join_many(&self, channels: &[&str]) -> Result<()> {
        for channel in channels {
            self.join(channel).await?;
        }
        Ok(())
    }

    /// Subscribe to the firehose. Requires privileged credentials.
    pub async fn join_lobby(&self) -> Result<()> {
        if self.inner.subscriptions.lock().contains(FIREHOSE_CHANNEL) {
            info!(feed = self.inner.feed_name, "Client - lobby channel already joined");
            return Ok(());
        }
        self.join(FIREHOSE_CHANNEL).await
    }

    /// Unsubscribe from a channel. A no-op when not joined.
    pub async fn leave(&self, channel: &str) -> Result<()> {
        let frame = {
            let mut ledger = self.inner.subscriptions.lock();
            ledger.leave(channel, |c| (self.inner.compose_leave)(c))
        };
        if let Some(frame) = frame {
            info!(feed = self.inner.feed_name, channel, "Client - leaving channel");
            self.inner.queue_write(frame).await;
        }
        Ok(())
    }

    pub async fn leave_many(&self, channels: &[&str]) -> Result<()> {
        for channel in channels {
            self.leave(channel).await?;
        }
        Ok(())
    }

    pub async fn leave_lobby(&self) -> Result<()> {
        self.leave(FIREHOSE_CHANNEL).await
    }

    /// Unsubscribe from every joined channel.
    pub async fn leave_all(&self) -> Result<()> {
        let frames = {
            let mut ledger = self.inner.subscriptions.lock();
            ledger.drain_all(|c| (self.inner.compose_leave)(c))
        };
        for frame in frames {
            self.inner.queue_write(frame).await;
        }
        Ok(())
    }

    /// Graceful, in-order shutdown: leave every channel, drain pending
    /// writes, close the socket, and wait for the workers to finish the
    /// read queue.
    pub async fn stop(&self) {
        info!(feed = self.inner.feed_name, "Client - Stopping...");
        self.inner.set_state(SessionState::Draining);
        let _ = self.leave_all().await;
        self.inner.stopped.store(true, Ordering::SeqCst);
        let mut handles = self.worker_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        self.inner.set_state(SessionState::Closed);
        self.inner.log_stats();
        info!(feed = self.inner.feed_name, "Client - Stopped");
    }

    /// Data and text frame counters plus current queue depth.
    pub fn log_stats(&self) {
        self.inner.log_stats();
    }
}

/// Network read loop. Pushes binary payloads into the bounded queue and
/// owns the reconnect path.
async fn run_reader(
    inner: Arc<ClientInner>,
    mut source: WsSource,
    writer: Arc<tokio::sync::Mutex<WsSink>>,
) {
    loop {
        match source.next().await {
            Some(Ok(Message::Binary(data))) => {
                inner.data_msg_count.fetch_add(1, Ordering::Relaxed);
                dispatch::log_push_outcome(inner.read_queue.push(data));
            }
            Some(Ok(Message::Text(text))) => {
                inner.txt_msg_count.fetch_add(1, Ordering::Relaxed);
                info!(feed = inner.feed_name, %text, "Client - server message");
            }
            Some(Ok(_)) => {}
            other => {
                if let Some(Err(err)) = other {
                    warn!(feed = inner.feed_name, %err, "Client - read error");
                }
                inner.closed.store(true, Ordering::SeqCst);
                if inner.stopped.load(Ordering::SeqCst) {
                    return;
                }
                inner.set_state(SessionState::Disconnected);
                match inner.reconnect(&writer).await {
                    Some(new_source) => source = new_source,
                    None => return,
                }
            }
        }
    }
}

/// Network write loop: heartbeat every 20 s while streaming, pending
/// frames as they arrive, and the close handshake on shutdown.
async fn run_writer(
    inner: Arc<ClientInner>,
    mut write_rx: mpsc::Receiver<Vec<u8>>,
    writer: Arc<tokio::sync::Mutex<WsSink>>,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        if inner.stopped.load(Ordering::SeqCst) {
            // Drain whatever is still queued (the leave frames from stop),
            // then close with code 1000 under a deadline.
            while let Ok(frame) = write_rx.try_recv() {
                let mut sink = writer.lock().await;
                if let Err(err) = sink.send(Message::Binary(frame)).await {
                    warn!(feed = inner.feed_name, %err, "Client - write error during drain");
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
            info!(feed = inner.feed_name, "Client - Sending close message");
            let close = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            }));
            let _ = tokio::time::timeout(CLOSE_DEADLINE, async {
                let mut sink = writer.lock().await;
                let _ = sink.send(close).await;
                let _ = sink.flush().await;
            })
            .await;
            return;
        }
        if inner.closed.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }
        tokio::select! {
            _ = heartbeat.tick() => {
                let mut sink = writer.lock().await;
                if let Err(err) = sink.send(Message::Binary(Vec::new())).await {
                    warn!(feed = inner.feed_name, %err, "Client - heartbeat error");
                }
                drop(sink);
                inner.log_stats();
            }
            frame = write_rx.recv() => {
                if let Some(frame) = frame {
                    let mut sink = writer.lock().await;
                    if let Err(err) = sink.send(Message::Binary(frame)).await {
                        warn!(feed = inner.feed_name, %err, "Client - write error");
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
    }
}
