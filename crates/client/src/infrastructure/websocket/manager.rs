//! Connection manager: one persistent real-time connection to the game server.
//!
//! [`ConnectionManager`] is a cloneable handle. All mutable connection state
//! lives in a single driver task that processes commands, socket events and
//! timer firings one at a time:
//!
//! ```text
//!   handle ──Command──►┐
//!   socket pump ──────►├─► driver ──► EventBus<ConnectionEvent>
//!   timers ──Internal─►┘          └─► EventBus<ServerFrame>
//! ```
//!
//! Every socket event and timer firing carries the epoch it was armed for.
//! The epoch is bumped whenever a socket is opened or torn down, so events
//! from a previous socket are dropped instead of corrupting the current one.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use racketeer_shared::{close_codes, ClientFrame, ServerFrame};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use super::core::{BackoffPolicy, BackoffState};
use super::shared::{socket_url, HEARTBEAT_INTERVAL_MS, HEARTBEAT_TIMEOUT_MS};
use crate::infrastructure::messaging::{
    ConnectionEvent, ConnectionState, ConnectionStateObserver, EventBus, Subscription,
};
use crate::infrastructure::scheduler::ScheduledTask;
use crate::ports::outbound::{
    CredentialProvider, OutboundFrame, SocketConnector, SocketEvent, SocketLink, TransportError,
};

/// Errors returned by [`ConnectionManager::connect`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("no bearer credential available")]
    MissingCredentials,

    #[error("invalid socket endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection was closed before it opened")]
    Disconnected,

    #[error("connection manager has shut down")]
    Shutdown,
}

/// Tunables for the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// HTTP origin of the game server; the socket endpoint is derived from it
    pub origin: Url,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl ConnectionConfig {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
            heartbeat_timeout: Duration::from_millis(HEARTBEAT_TIMEOUT_MS),
            backoff: BackoffPolicy::default(),
        }
    }
}

type ConnectReply = oneshot::Sender<Result<(), ConnectionError>>;

enum Command {
    Connect(ConnectReply),
    Disconnect(oneshot::Sender<()>),
    Send(ClientFrame),
    Subscribe(String),
    Unsubscribe(String),
}

/// Channel operation sent to the server and not yet acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Subscribe,
    Unsubscribe,
}

fn control_channel(frame: &ClientFrame) -> Option<&str> {
    match frame {
        ClientFrame::Subscribe { channel } | ClientFrame::Unsubscribe { channel } => Some(channel),
        _ => None,
    }
}

enum Internal {
    Opened {
        epoch: u64,
        result: Result<SocketLink, TransportError>,
    },
    Socket {
        epoch: u64,
        event: SocketEvent,
    },
    HeartbeatDue {
        epoch: u64,
    },
    HeartbeatTimeout {
        epoch: u64,
        probe: u64,
    },
    ReconnectDue {
        epoch: u64,
    },
}

/// State readable from any handle without going through the driver.
struct Shared {
    state: Arc<AtomicU8>,
    channels: Mutex<BTreeSet<String>>,
    peer_count: AtomicU32,
    attempts: AtomicU32,
    buffered: AtomicUsize,
    events: EventBus<ConnectionEvent>,
    frames: EventBus<ServerFrame>,
}

impl Shared {
    fn channels(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the persistent connection. Cloning shares the connection.
///
/// Must be created inside a tokio runtime. The driver task stops, closing the
/// socket normally, once every handle has been dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn SocketConnector>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            state: Arc::new(AtomicU8::new(ConnectionState::Disconnected.to_u8())),
            channels: Mutex::new(BTreeSet::new()),
            peer_count: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            buffered: AtomicUsize::new(0),
            events: EventBus::new(),
            frames: EventBus::new(),
        });

        let driver = Driver {
            backoff: BackoffState::new(config.backoff),
            config,
            connector,
            credentials,
            shared: Arc::clone(&shared),
            internal_tx,
            epoch: 0,
            socket: None,
            pump: None,
            outbox: VecDeque::new(),
            intents: BTreeMap::new(),
            waiters: Vec::new(),
            heartbeat: None,
            probe_seq: 0,
            awaiting_pong: None,
            reconnect: None,
        };
        tokio::spawn(driver.run(command_rx, internal_rx));

        Self { commands, shared }
    }

    /// Open the connection.
    ///
    /// Idempotent: resolves immediately when already connected and joins the
    /// in-flight attempt while connecting. Fails without touching the network
    /// when no credential is available. A failed attempt schedules a retry.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect(reply))
            .map_err(|_| ConnectionError::Shutdown)?;
        rx.await.map_err(|_| ConnectionError::Shutdown)?
    }

    /// Intentional teardown. Never triggers a reconnect.
    ///
    /// Clears the channel set. Frames still buffered wait for the next open.
    pub async fn disconnect(&self) {
        let (done, rx) = oneshot::channel();
        if self.commands.send(Command::Disconnect(done)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Transmit now if open, otherwise buffer until the next open.
    pub fn send(&self, frame: ClientFrame) {
        if self.commands.send(Command::Send(frame)).is_err() {
            tracing::warn!("Connection manager shut down; dropping outbound frame");
        }
    }

    pub fn publish(&self, channel: impl Into<String>, data: serde_json::Value) {
        self.send(ClientFrame::publish(channel, data));
    }

    pub fn subscribe(&self, channel: impl Into<String>) {
        let _ = self.commands.send(Command::Subscribe(channel.into()));
    }

    pub fn unsubscribe(&self, channel: impl Into<String>) {
        let _ = self.commands.send(Command::Unsubscribe(channel.into()));
    }

    /// Listen for inbound frames of one type (`"stat_update"`, `"broadcast"`, ...).
    pub fn on(
        &self,
        kind: &'static str,
        listener: impl Fn(&ServerFrame) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared
            .frames
            .subscribe_where(move |frame| frame.kind() == kind, listener)
    }

    /// Listen for every inbound frame.
    pub fn on_any(&self, listener: impl Fn(&ServerFrame) + Send + Sync + 'static) -> Subscription {
        self.shared.frames.subscribe(listener)
    }

    /// Lifecycle events: state changes, handshake, heartbeat and retry failures.
    pub fn events(&self) -> &EventBus<ConnectionEvent> {
        &self.shared.events
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        ConnectionStateObserver::new(Arc::clone(&self.shared.state))
    }

    /// Snapshot of the acknowledged channel set, sorted.
    pub fn channels(&self) -> Vec<String> {
        self.shared.channels().iter().cloned().collect()
    }

    /// Peer count from the last handshake; zero while not connected.
    pub fn peer_count(&self) -> u32 {
        self.shared.peer_count.load(Ordering::SeqCst)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Frames waiting for the connection to open.
    pub fn buffered_len(&self) -> usize {
        self.shared.buffered.load(Ordering::SeqCst)
    }
}

struct Driver {
    config: ConnectionConfig,
    connector: Arc<dyn SocketConnector>,
    credentials: Arc<dyn CredentialProvider>,
    shared: Arc<Shared>,
    internal_tx: mpsc::UnboundedSender<Internal>,

    epoch: u64,
    backoff: BackoffState,
    socket: Option<mpsc::UnboundedSender<OutboundFrame>>,
    pump: Option<JoinHandle<()>>,
    outbox: VecDeque<ClientFrame>,
    /// Latest requested operation per channel, until the server acknowledges it
    intents: BTreeMap<String, Intent>,
    waiters: Vec<ConnectReply>,

    heartbeat: Option<ScheduledTask>,
    probe_seq: u64,
    awaiting_pong: Option<(u64, ScheduledTask)>,
    reconnect: Option<ScheduledTask>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::debug!("All connection handles dropped, shutting down driver");
                        self.teardown_intentional();
                        break;
                    }
                },
                Some(event) = internal.recv() => self.handle_internal(event),
            }
        }
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, current: ConnectionState) {
        let previous =
            ConnectionState::from_u8(self.shared.state.swap(current.to_u8(), Ordering::SeqCst));
        if previous != current {
            tracing::debug!(%previous, %current, "Connection state changed");
            self.shared
                .events
                .emit(&ConnectionEvent::StateChanged { previous, current });
        }
    }

    fn sync_counters(&self) {
        self.shared
            .attempts
            .store(self.backoff.attempts(), Ordering::SeqCst);
        self.shared
            .buffered
            .store(self.outbox.len(), Ordering::SeqCst);
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => self.handle_connect(reply),
            Command::Disconnect(done) => {
                tracing::info!("Disconnect requested");
                self.teardown_intentional();
                let _ = done.send(());
            }
            Command::Send(frame) => self.send_frame(frame),
            Command::Subscribe(channel) => self.request(channel, Intent::Subscribe),
            Command::Unsubscribe(channel) => self.request(channel, Intent::Unsubscribe),
        }
    }

    /// Whether the last request for `channel` was to join it, acknowledged or not.
    fn wants(&self, channel: &str) -> bool {
        match self.intents.get(channel) {
            Some(intent) => *intent == Intent::Subscribe,
            None => self.shared.channels().contains(channel),
        }
    }

    fn request(&mut self, channel: String, intent: Intent) {
        let join = intent == Intent::Subscribe;
        if self.wants(&channel) == join {
            tracing::debug!(%channel, ?intent, "Channel already in requested state");
            return;
        }
        self.intents.insert(channel.clone(), intent);
        let frame = if join {
            ClientFrame::subscribe(channel)
        } else {
            ClientFrame::unsubscribe(channel)
        };
        self.send_frame(frame);
    }

    fn handle_connect(&mut self, reply: ConnectReply) {
        match self.state() {
            ConnectionState::Connected => {
                let _ = reply.send(Ok(()));
            }
            ConnectionState::Connecting => self.waiters.push(reply),
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                match self.endpoint() {
                    Ok(url) => {
                        self.reconnect = None;
                        self.waiters.push(reply);
                        self.open(url);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Cannot connect");
                        let _ = reply.send(Err(e));
                    }
                }
            }
        }
    }

    fn endpoint(&self) -> Result<Url, ConnectionError> {
        let token = self
            .credentials
            .bearer_token()
            .filter(|token| !token.is_empty())
            .ok_or(ConnectionError::MissingCredentials)?;
        socket_url(&self.config.origin, &token)
            .map_err(|e| ConnectionError::InvalidEndpoint(e.to_string()))
    }

    fn send_frame(&mut self, frame: ClientFrame) {
        if self.state() == ConnectionState::Connected && self.transmit(&frame) {
            return;
        }
        tracing::debug!(queued = self.outbox.len() + 1, "Buffering outbound frame");
        self.outbox.push_back(frame);
        self.sync_counters();
    }

    /// Hand a frame to the socket. False if the socket is gone.
    ///
    /// A frame that cannot be serialized is logged and counts as handled.
    fn transmit(&self, frame: &ClientFrame) -> bool {
        let Some(socket) = &self.socket else {
            return false;
        };
        match frame.to_json() {
            Ok(text) => socket.send(OutboundFrame::Text(text)).is_ok(),
            Err(e) => {
                tracing::error!("Failed to serialize outbound frame: {}", e);
                true
            }
        }
    }

    // =========================================================================
    // Socket lifecycle
    // =========================================================================

    fn open(&mut self, url: Url) {
        self.epoch += 1;
        let epoch = self.epoch;
        self.set_state(ConnectionState::Connecting);
        tracing::info!(epoch, attempt = self.backoff.attempts(), "Opening socket");

        let connector = Arc::clone(&self.connector);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = connector.connect(&url).await;
            let _ = tx.send(Internal::Opened { epoch, result });
        });
    }

    fn on_opened(&mut self, link: SocketLink) {
        let epoch = self.epoch;
        let SocketLink {
            outbound,
            mut inbound,
        } = link;
        self.socket = Some(outbound);

        let tx = self.internal_tx.clone();
        self.pump = Some(tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                let closed = matches!(event, SocketEvent::Closed { .. });
                if tx.send(Internal::Socket { epoch, event }).is_err() || closed {
                    return;
                }
            }
            let _ = tx.send(Internal::Socket {
                epoch,
                event: SocketEvent::Closed {
                    code: close_codes::ABNORMAL,
                    reason: "socket stream ended".to_string(),
                },
            });
        }));

        self.backoff.reset();
        self.set_state(ConnectionState::Connected);
        tracing::info!(epoch, "Connected");

        // Channels first, then whatever was buffered, then heartbeats
        for frame in self.channel_replay() {
            if !self.transmit(&frame) {
                self.outbox.push_back(frame);
            }
        }
        self.flush_outbox();
        self.sync_counters();

        let tx = self.internal_tx.clone();
        self.heartbeat = Some(ScheduledTask::every(
            self.config.heartbeat_interval,
            move || {
                let _ = tx.send(Internal::HeartbeatDue { epoch });
            },
        ));

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    /// Control frames a fresh socket needs before the buffer is flushed.
    ///
    /// Every acknowledged channel is joined again. Requests that went out on a
    /// previous socket and were never acknowledged are repeated; requests still
    /// in the buffer go out with it.
    fn channel_replay(&mut self) -> Vec<ClientFrame> {
        let buffered: BTreeSet<&str> = self.outbox.iter().filter_map(control_channel).collect();
        let acked = self.shared.channels().clone();

        let mut join = acked.clone();
        let mut leave = Vec::new();
        let mut settled = Vec::new();
        for (channel, intent) in &self.intents {
            if buffered.contains(channel.as_str()) {
                continue;
            }
            match intent {
                Intent::Subscribe => {
                    join.insert(channel.clone());
                }
                Intent::Unsubscribe if acked.contains(channel) => leave.push(channel.clone()),
                Intent::Unsubscribe => settled.push(channel.clone()),
            }
        }
        for channel in settled {
            self.intents.remove(&channel);
        }

        let mut frames: Vec<ClientFrame> = join
            .into_iter()
            .inspect(|channel| tracing::debug!(%channel, "Re-subscribing"))
            .map(ClientFrame::subscribe)
            .collect();
        frames.extend(leave.into_iter().map(ClientFrame::unsubscribe));
        frames
    }

    fn flush_outbox(&mut self) {
        if !self.outbox.is_empty() {
            tracing::debug!(count = self.outbox.len(), "Flushing buffered frames");
        }
        while let Some(frame) = self.outbox.pop_front() {
            if !self.transmit(&frame) {
                self.outbox.push_front(frame);
                break;
            }
        }
    }

    /// Drop the current socket and every timer tied to it.
    fn teardown_socket(&mut self, close: Option<(u16, &str)>) {
        self.epoch += 1;
        self.heartbeat = None;
        self.awaiting_pong = None;
        self.reconnect = None;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(socket) = self.socket.take() {
            if let Some((code, reason)) = close {
                let _ = socket.send(OutboundFrame::Close {
                    code,
                    reason: reason.to_string(),
                });
            }
        }
        self.shared.peer_count.store(0, Ordering::SeqCst);
    }

    fn teardown_intentional(&mut self) {
        self.teardown_socket(Some((close_codes::NORMAL, "client disconnect")));
        self.backoff.reset();
        self.shared.channels().clear();
        self.intents.clear();
        self.fail_waiters(ConnectionError::Disconnected);
        self.sync_counters();
        self.set_state(ConnectionState::Disconnected);
    }

    fn fail_waiters(&mut self, error: ConnectionError) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(error.clone()));
        }
    }

    /// Any close we did not ask for.
    fn on_closed(&mut self, code: u16, reason: String, close: Option<(u16, &str)>) {
        self.teardown_socket(close);

        if close_codes::is_auth_failure(code) {
            tracing::warn!(code, %reason, "Server rejected credentials; not reconnecting");
            self.backoff.reset();
            self.sync_counters();
            self.fail_waiters(ConnectionError::Transport(format!(
                "authentication failed ({code})"
            )));
            self.set_state(ConnectionState::Disconnected);
            self.shared
                .events
                .emit(&ConnectionEvent::AuthenticationFailed { code, reason });
            return;
        }

        if code == close_codes::NORMAL {
            tracing::info!(%reason, "Server closed the connection normally");
            self.backoff.reset();
            self.sync_counters();
            self.fail_waiters(ConnectionError::Disconnected);
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        tracing::warn!(code, %reason, "Connection lost");
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        match self.backoff.next_delay_and_advance() {
            Some(delay) => {
                self.sync_counters();
                self.set_state(ConnectionState::Reconnecting);
                tracing::info!(
                    attempt = self.backoff.attempts(),
                    max_attempts = self.backoff.policy().max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnection"
                );
                let epoch = self.epoch;
                let tx = self.internal_tx.clone();
                self.reconnect = Some(ScheduledTask::after(delay, move || {
                    let _ = tx.send(Internal::ReconnectDue { epoch });
                }));
            }
            None => {
                let attempts = self.backoff.attempts();
                tracing::error!(attempts, "Max reconnection attempts reached, giving up");
                self.backoff.reset();
                self.sync_counters();
                self.set_state(ConnectionState::Disconnected);
                self.shared
                    .events
                    .emit(&ConnectionEvent::MaxRetriesExhausted { attempts });
            }
        }
    }

    // =========================================================================
    // Internal events
    // =========================================================================

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Opened { epoch, result } => {
                if epoch != self.epoch || self.state() != ConnectionState::Connecting {
                    // Dropping a stale link closes it
                    tracing::debug!(epoch, current = self.epoch, "Discarding stale socket");
                    return;
                }
                match result {
                    Ok(link) => self.on_opened(link),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to open socket");
                        self.on_closed(close_codes::ABNORMAL, e.to_string(), None);
                        self.fail_waiters(ConnectionError::Transport(e.to_string()));
                    }
                }
            }
            Internal::Socket { epoch, event } => {
                if epoch != self.epoch {
                    return;
                }
                match event {
                    SocketEvent::Text(text) => self.handle_frame(&text),
                    SocketEvent::Closed { code, reason } => self.on_closed(code, reason, None),
                }
            }
            Internal::HeartbeatDue { epoch } => {
                if epoch != self.epoch || self.state() != ConnectionState::Connected {
                    return;
                }
                self.send_heartbeat();
            }
            Internal::HeartbeatTimeout { epoch, probe } => {
                let armed = matches!(self.awaiting_pong, Some((seq, _)) if seq == probe);
                if epoch != self.epoch || !armed {
                    return;
                }
                tracing::warn!(probe, "Heartbeat not acknowledged; recycling socket");
                self.shared.events.emit(&ConnectionEvent::HeartbeatFailed);
                self.on_closed(
                    close_codes::HEARTBEAT_FAILURE,
                    "heartbeat timeout".to_string(),
                    Some((close_codes::HEARTBEAT_FAILURE, "heartbeat timeout")),
                );
            }
            Internal::ReconnectDue { epoch } => {
                if epoch != self.epoch || self.state() != ConnectionState::Reconnecting {
                    return;
                }
                self.reconnect = None;
                match self.endpoint() {
                    Ok(url) => self.open(url),
                    Err(e) => {
                        tracing::warn!(error = %e, "Cannot reconnect; giving up");
                        self.backoff.reset();
                        self.sync_counters();
                        self.set_state(ConnectionState::Disconnected);
                        self.shared.events.emit(&ConnectionEvent::ReconnectAbandoned {
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn send_heartbeat(&mut self) {
        if self.awaiting_pong.is_some() {
            // Previous probe still outstanding; its timeout decides
            return;
        }
        let ping = ClientFrame::Ping {
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        if !self.transmit(&ping) {
            return;
        }

        self.probe_seq += 1;
        let probe = self.probe_seq;
        let epoch = self.epoch;
        let tx = self.internal_tx.clone();
        let timeout = ScheduledTask::after(self.config.heartbeat_timeout, move || {
            let _ = tx.send(Internal::HeartbeatTimeout { epoch, probe });
        });
        self.awaiting_pong = Some((probe, timeout));
    }

    fn handle_frame(&mut self, text: &str) {
        let frame = match ServerFrame::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to parse server frame: {}", e);
                return;
            }
        };

        match &frame {
            ServerFrame::Pong { .. } => {
                self.awaiting_pong = None;
            }
            ServerFrame::Connected { peer_count } => {
                self.shared.peer_count.store(*peer_count, Ordering::SeqCst);
                tracing::info!(peer_count, "Handshake received");
                self.shared.events.emit(&ConnectionEvent::Established {
                    peer_count: *peer_count,
                });
            }
            ServerFrame::Subscribed { channel } => {
                self.on_acknowledged(channel, Intent::Subscribe)
            }
            ServerFrame::Unsubscribed { channel } => {
                self.on_acknowledged(channel, Intent::Unsubscribe)
            }
            ServerFrame::Unknown => {
                tracing::debug!(frame = %text, "Ignoring unknown frame type");
                return;
            }
            _ => {}
        }

        self.shared.frames.emit(&frame);
    }

    /// Apply a server acknowledgment to the channel set.
    ///
    /// An acknowledgment that contradicts a newer request is ignored; the
    /// acknowledgment of that newer request settles the channel.
    fn on_acknowledged(&mut self, channel: &str, acked: Intent) {
        match self.intents.get(channel).copied() {
            Some(latest) if latest != acked => {
                tracing::debug!(%channel, ?acked, ?latest, "Ignoring superseded acknowledgment");
                return;
            }
            Some(_) => {
                self.intents.remove(channel);
            }
            None => {}
        }

        let changed = match acked {
            Intent::Subscribe => self.shared.channels().insert(channel.to_string()),
            Intent::Unsubscribe => self.shared.channels().remove(channel),
        };
        if !changed {
            return;
        }
        let event = match acked {
            Intent::Subscribe => ConnectionEvent::ChannelSubscribed(channel.to_string()),
            Intent::Unsubscribe => ConnectionEvent::ChannelUnsubscribed(channel.to_string()),
        };
        tracing::debug!(%channel, ?acked, "Channel set changed");
        self.shared.events.emit(&event);
    }
}
