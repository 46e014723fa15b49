//! Reconnecting event-stream client for the pulse dashboard.
//!
//! Provides a persistent WebSocket connection with:
//! - Connection state machine (Disconnected/Connecting/Connected/Reconnecting/Failed)
//! - Automatic reconnection with capped exponential backoff
//! - Heartbeats and heartbeat acknowledgments
//! - Frame validation and delivery-latency tracking
//! - FIFO outbound queue flushed on (re)connect
//! - Cache bridge invalidating dashboard queries on push notifications

pub mod bridge;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod metrics;
pub mod outbound;

pub use bridge::{CacheBridge, CacheRule, ItemOverwrite, CACHE_RULES};
pub use connection::{
    reconnect_delay, ConnectionState, EventStreamClient, StreamConfig, StreamNotification,
};
pub use error::{WsError, WsResult};
pub use heartbeat::{HeartbeatManager, HeartbeatStats};
pub use message::{parse_frame, FrameError, OutboundMessage, HEARTBEAT_ACK_TYPE, PROTOCOL_VERSION};
pub use metrics::{ConnectionMetrics, LatencyWindow, LATENCY_WINDOW};
pub use outbound::{OutboundQueue, SendOutcome};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
