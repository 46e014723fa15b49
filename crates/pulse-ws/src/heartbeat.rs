//! Heartbeat bookkeeping for the event stream.
//!
//! The client sends an application-level heartbeat every interval while
//! connected and acknowledges heartbeats pushed by the server.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Heartbeat manager for one stream client.
pub struct HeartbeatManager {
    /// How often to send a heartbeat.
    interval_ms: u64,
    /// Last heartbeat sent by us.
    last_sent: RwLock<Option<DateTime<Utc>>>,
    /// Last heartbeat received from the server.
    last_peer: RwLock<Option<DateTime<Utc>>>,
    /// Heartbeats sent on the current connection.
    sent_count: RwLock<u64>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_sent: RwLock::new(None),
            last_peer: RwLock::new(None),
            sent_count: RwLock::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Reset heartbeat state (called on connection).
    pub fn reset(&self) {
        *self.last_sent.write() = None;
        *self.last_peer.write() = None;
        *self.sent_count.write() = 0;
    }

    /// Ticker for one connection. The first tick fires one interval after
    /// the connection opens.
    pub fn ticker(&self) -> Interval {
        let period = self.interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Record that a heartbeat was sent.
    pub fn record_sent(&self) {
        let now = Utc::now();
        *self.last_sent.write() = Some(now);
        *self.sent_count.write() += 1;
        debug!(time = %now, "Sent heartbeat");
    }

    /// Record a heartbeat pushed by the server.
    pub fn record_peer(&self) {
        let now = Utc::now();
        *self.last_peer.write() = Some(now);
        debug!(time = %now, "Received server heartbeat");
    }

    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            interval_ms: self.interval_ms,
            last_sent: *self.last_sent.read(),
            last_peer: *self.last_peer.read(),
            sent_count: *self.sent_count.read(),
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatStats {
    pub interval_ms: u64,
    pub last_sent: Option<DateTime<Utc>>,
    pub last_peer: Option<DateTime<Utc>>,
    pub sent_count: u64,
}
