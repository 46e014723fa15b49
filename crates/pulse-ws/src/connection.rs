//! Event stream connection manager.
//!
//! Owns the connection state machine, automatic reconnection with capped
//! exponential backoff, heartbeats and the outbound queue. Incoming events are
//! applied to the cache bridge and then broadcast to subscribers.

use crate::bridge::CacheBridge;
use crate::error::{WsError, WsResult};
use crate::heartbeat::{HeartbeatManager, HeartbeatStats};
use crate::message::{parse_frame, OutboundMessage};
use crate::metrics::{ConnectionMetrics, StreamMetrics};
use crate::outbound::{OutboundQueue, SendOutcome};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use pulse_core::{CacheHandle, CredentialSource, InboundEvent};
use pulse_telemetry::Metrics;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open socket and the outbound channel already attached to it.
type Session = (WsStream, mpsc::UnboundedReceiver<OutboundMessage>);
type WsSink = SplitSink<WsStream, Message>;

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_NO_STATUS: u16 = 1005;
const CLOSE_ABNORMAL: u16 = 1006;

/// Backoff stops doubling after this many doublings.
const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Stream client configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    pub client_name: String,
    pub client_version: String,
    /// Reconnect attempts after an abnormal close before giving up.
    pub reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Handshake budget for each connect attempt.
    pub connect_timeout_ms: u64,
    /// Buffered notifications per subscriber before it starts lagging.
    pub notification_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws".to_string(),
            client_name: "pulse-dash".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            reconnect_attempts: 10,
            reconnect_delay_ms: 1000,
            heartbeat_interval_ms: 30000,
            connect_timeout_ms: 10000,
            notification_capacity: 256,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected | Failed, Connecting)
                | (Connecting, Connected | Failed | Reconnecting | Disconnected)
                | (Connected, Reconnecting | Disconnected)
                | (Reconnecting, Connecting | Failed | Disconnected)
                | (Failed, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast to `EventStreamClient::subscribe` receivers.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotification {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// A validated, non-heartbeat event, after the cache bridge ran.
    Event(InboundEvent),
    Error(String),
}

/// Delay before reconnect attempt `attempt` (1-based):
/// `base * 2^min(attempt - 1, 5)`.
pub fn reconnect_delay(attempt: u32, base_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    Duration::from_millis(base_ms.saturating_mul(1u64 << exponent))
}

/// How a connection ended.
#[derive(Debug, PartialEq)]
enum SessionEnd {
    /// `disconnect()` was called.
    Cancelled,
    /// Server closed with 1000.
    Clean,
    Abnormal { code: u16, reason: String },
}

impl SessionEnd {
    fn from_close(code: u16, reason: String) -> Self {
        if code == CLOSE_NORMAL {
            Self::Clean
        } else {
            Self::Abnormal { code, reason }
        }
    }

    fn write_failed(e: WsError) -> Self {
        Self::Abnormal {
            code: CLOSE_ABNORMAL,
            reason: e.to_string(),
        }
    }
}

struct Shared {
    config: StreamConfig,
    credentials: Arc<dyn CredentialSource>,
    bridge: CacheBridge,
    state: RwLock<ConnectionState>,
    metrics: StreamMetrics,
    heartbeat: HeartbeatManager,
    outbound: OutboundQueue,
    notifications: broadcast::Sender<StreamNotification>,
    /// Cancelled by `disconnect()`; replaced on every `connect()`.
    shutdown: Mutex<CancellationToken>,
}

/// Reconnecting event-stream client.
pub struct EventStreamClient {
    shared: Arc<Shared>,
    /// Background task of the active connection. Also serializes
    /// `connect` and `disconnect`.
    driver: TokioMutex<Option<JoinHandle<()>>>,
}

impl EventStreamClient {
    pub fn new(
        config: StreamConfig,
        cache: Arc<dyn CacheHandle>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(config, cache, credentials)),
            driver: TokioMutex::new(None),
        }
    }

    /// Open the connection and start the background task.
    ///
    /// Returns the state after the call. A fresh handshake yields
    /// `Connected`. If a connection task is already active nothing is
    /// opened and its current state is returned, which may be
    /// `Connecting` or `Reconnecting` while it is still trying.
    ///
    /// A handshake that does not finish within `connect_timeout_ms` fails
    /// with `WsError::ConnectionTimeout` and leaves the client `Failed`.
    pub async fn connect(&self) -> WsResult<ConnectionState> {
        let mut driver = self.driver.lock().await;
        if driver.as_ref().is_some_and(|task| !task.is_finished()) {
            let state = self.state();
            debug!(%state, "Event stream already active");
            return Ok(state);
        }

        let token = CancellationToken::new();
        *self.shared.shutdown.lock() = token.clone();

        self.shared.transition(ConnectionState::Connecting);
        self.shared.metrics.connect_started();
        match self.shared.open().await {
            Ok(stream) => {
                let outbound_rx = self.shared.on_open();
                let session = (stream, outbound_rx);
                *driver = Some(tokio::spawn(Arc::clone(&self.shared).drive(session, token)));
                Ok(ConnectionState::Connected)
            }
            Err(e) => {
                error!(error = %e, "Event stream connect failed");
                self.shared.notify_error(&e);
                self.shared.transition(ConnectionState::Failed);
                Err(e)
            }
        }
    }

    /// Close the connection, stop reconnecting and cancel pending timers.
    pub async fn disconnect(&self) {
        let mut driver = self.driver.lock().await;
        self.shared.shutdown.lock().cancel();
        if let Some(task) = driver.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Event stream task ended abnormally");
            }
        }
        self.shared.metrics.disconnected();
        self.shared.transition(ConnectionState::Disconnected);
        info!("Event stream disconnected");
    }

    /// Send a message now if connected, otherwise queue it for the next
    /// connection.
    pub fn send(&self, kind: impl Into<String>, data: Value) -> SendOutcome {
        let message = OutboundMessage::new(kind, data);
        let kind = message.kind.clone();
        let outcome = self.shared.outbound.submit(message);
        if outcome == SendOutcome::Queued {
            debug!(%kind, queued = self.shared.outbound.pending_len(), "Stream message queued");
        }
        outcome
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn metrics(&self) -> ConnectionMetrics {
        self.shared.metrics.snapshot()
    }

    pub fn heartbeat_stats(&self) -> HeartbeatStats {
        self.shared.heartbeat.stats()
    }

    /// Messages waiting for a connection.
    pub fn queued_len(&self) -> usize {
        self.shared.outbound.pending_len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamNotification> {
        self.shared.notifications.subscribe()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        self.shared.shutdown.lock().cancel();
    }
}

impl Shared {
    fn new(
        config: StreamConfig,
        cache: Arc<dyn CacheHandle>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        Self {
            heartbeat: HeartbeatManager::new(config.heartbeat_interval_ms),
            config,
            credentials,
            bridge: CacheBridge::new(cache),
            state: RwLock::new(ConnectionState::Disconnected),
            metrics: StreamMetrics::default(),
            outbound: OutboundQueue::new(),
            notifications,
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    /// Apply a state change if the state machine allows it.
    fn transition(&self, to: ConnectionState) -> bool {
        let from = {
            let mut state = self.state.write();
            let from = *state;
            if from == to {
                return false;
            }
            if !from.can_transition_to(to) {
                warn!(%from, %to, "Ignoring invalid state transition");
                return false;
            }
            *state = to;
            from
        };

        info!(%from, %to, "Event stream state changed");
        Metrics::stream_state_set(to.as_str());
        let _ = self
            .notifications
            .send(StreamNotification::StateChanged { from, to });
        true
    }

    fn notify_error(&self, e: &WsError) {
        let _ = self
            .notifications
            .send(StreamNotification::Error(e.to_string()));
    }

    /// Stream URL with credential and client identity query parameters.
    fn endpoint(&self) -> WsResult<Url> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| WsError::InvalidUrl(format!("{}: {e}", self.config.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(WsError::InvalidUrl(format!(
                "{}: scheme must be ws or wss",
                self.config.url
            )));
        }

        {
            let mut query = url.query_pairs_mut();
            if let Some(token) = self.credentials.bearer_token() {
                query.append_pair("token", &token);
            }
            query.append_pair("client", &self.config.client_name);
            query.append_pair("version", &self.config.client_version);
        }
        Ok(url)
    }

    /// Handshake under the connect budget. The token is never logged.
    async fn open(&self) -> WsResult<WsStream> {
        let url = self.endpoint()?;
        info!(url = %self.config.url, "Connecting to event stream");

        let budget_ms = self.config.connect_timeout_ms;
        match tokio::time::timeout(
            Duration::from_millis(budget_ms),
            // TCP_NODELAY for lower latency (disable Nagle's algorithm)
            connect_async_tls_with_config(url.as_str(), None, true, None),
        )
        .await
        {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(WsError::ConnectionTimeout { budget_ms }),
        }
    }

    /// Attach the outbound channel, then report `Connected`, so a `send`
    /// that observes `Connected` always goes straight to the socket.
    fn on_open(&self) -> mpsc::UnboundedReceiver<OutboundMessage> {
        let outbound_rx = self.outbound.attach();
        self.transition(ConnectionState::Connected);
        self.metrics.connected();
        self.heartbeat.reset();
        info!(
            time_to_connect_ms = self.metrics.snapshot().time_to_connect_ms,
            "Event stream connected"
        );
        outbound_rx
    }

    /// Run connections until a clean close, a disconnect or exhausted
    /// reconnects.
    async fn drive(self: Arc<Self>, mut session: Session, token: CancellationToken) {
        loop {
            match self.run_session(session, &token).await {
                SessionEnd::Cancelled => {
                    debug!("Event stream session cancelled");
                    return;
                }
                SessionEnd::Clean => {
                    info!("Event stream closed by server");
                    self.transition(ConnectionState::Disconnected);
                    return;
                }
                SessionEnd::Abnormal { code, reason } => {
                    let e = WsError::ConnectionClosed { code, reason };
                    warn!(error = %e, "Event stream closed abnormally");
                    self.notify_error(&e);
                    self.transition(ConnectionState::Reconnecting);
                    match self.reconnect(&token).await {
                        Some(next) => session = next,
                        None => return,
                    }
                }
            }
        }
    }

    async fn reconnect(&self, token: &CancellationToken) -> Option<Session> {
        let max_attempts = self.config.reconnect_attempts;
        for attempt in 1..=max_attempts {
            let delay = reconnect_delay(attempt, self.config.reconnect_delay_ms);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );

            // Wait for delay OR disconnect (cancellation-aware sleep)
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = token.cancelled() => {
                    info!("Disconnect requested during backoff");
                    return None;
                }
            }

            self.metrics.record_reconnect_attempt();
            Metrics::stream_reconnect("abnormal_close");
            self.transition(ConnectionState::Connecting);
            self.metrics.connect_started();

            let result = tokio::select! {
                result = self.open() => result,
                () = token.cancelled() => {
                    info!("Disconnect requested during reconnect");
                    return None;
                }
            };
            match result {
                Ok(stream) => {
                    info!(attempt, "Event stream reconnected");
                    let outbound_rx = self.on_open();
                    return Some((stream, outbound_rx));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnect attempt failed");
                    self.notify_error(&e);
                    self.transition(ConnectionState::Reconnecting);
                }
            }
        }

        error!(max_attempts, "Reconnect attempts exhausted");
        self.transition(ConnectionState::Failed);
        None
    }

    async fn run_session(&self, session: Session, token: &CancellationToken) -> SessionEnd {
        let (stream, mut outbound_rx) = session;
        let (mut write, mut read) = stream.split();
        let mut heartbeat = self.heartbeat.ticker();
        let mut failed = None;

        let end = loop {
            // Disconnect first; the other branches are polled in random order.
            if token.is_cancelled() {
                break Self::close_on_disconnect(&mut write).await;
            }

            tokio::select! {
                () = token.cancelled() => {
                    break Self::close_on_disconnect(&mut write).await;
                }

                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = self.handle_text(&text) {
                            if let Err(e) = self.write_message(&mut write, &reply).await {
                                break SessionEnd::write_failed(e);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            break SessionEnd::write_failed(e.into());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((CLOSE_NO_STATUS, String::new()));
                        break SessionEnd::from_close(code, reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break SessionEnd::Abnormal {
                            code: CLOSE_ABNORMAL,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        break SessionEnd::Abnormal {
                            code: CLOSE_ABNORMAL,
                            reason: "stream ended".to_string(),
                        };
                    }
                },

                Some(message) = outbound_rx.recv() => {
                    if let Err(e) = self.write_message(&mut write, &message).await {
                        failed = Some(message);
                        break SessionEnd::write_failed(e);
                    }
                }

                _ = heartbeat.tick() => {
                    if let Err(e) = self.write_message(&mut write, &OutboundMessage::heartbeat()).await {
                        break SessionEnd::write_failed(e);
                    }
                    self.heartbeat.record_sent();
                }
            }
        };

        self.outbound.detach(outbound_rx, failed);
        self.metrics.disconnected();
        end
    }

    /// Validate, count and dispatch one text frame. Returns the reply to
    /// send, if any.
    fn handle_text(&self, text: &str) -> Option<OutboundMessage> {
        let received_at = Utc::now();
        let event = match parse_frame(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping invalid stream frame");
                Metrics::stream_dropped(e.reason());
                return None;
            }
        };

        let latency_ms = event.latency_ms(received_at);
        self.metrics.record_received(latency_ms, received_at);
        Metrics::stream_received(event.kind.as_str(), latency_ms);
        debug!(kind = %event.kind, request_id = %event.correlation_id, latency_ms, "Stream event");

        self.bridge.apply(&event);
        if event.is_heartbeat() {
            self.heartbeat.record_peer();
            return Some(OutboundMessage::heartbeat_ack(&event.correlation_id));
        }

        let _ = self.notifications.send(StreamNotification::Event(event));
        None
    }

    async fn close_on_disconnect(write: &mut WsSink) -> SessionEnd {
        let close = CloseFrame {
            code: CloseCode::Normal,
            reason: "client disconnect".into(),
        };
        if let Err(e) = write.send(Message::Close(Some(close))).await {
            warn!(error = %e, "Failed to send Close frame during disconnect");
        }
        SessionEnd::Cancelled
    }

    async fn write_message(&self, write: &mut WsSink, message: &OutboundMessage) -> WsResult<()> {
        let text = message.encode()?;
        write.send(Message::Text(text)).await?;
        self.metrics.record_sent();
        Metrics::stream_sent();
        debug!(kind = %message.kind, "Sent stream message");
        Ok(())
    }
}
