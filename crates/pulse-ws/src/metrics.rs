//! Connection metrics for the event stream.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;

/// Latency samples kept for the rolling average.
pub const LATENCY_WINDOW: usize = 100;

/// Rolling window of delivery latencies.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(LATENCY_WINDOW)
    }
}

impl LatencyWindow {
    /// A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, latency_ms: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    /// Mean of the retained samples; 0 when empty.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Snapshot of the stream's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionMetrics {
    /// Handshake duration of the most recent successful connect.
    pub time_to_connect_ms: Option<u64>,
    pub messages_received: u64,
    /// Includes heartbeats and heartbeat acknowledgments.
    pub messages_sent: u64,
    /// Reconnect attempts made since the client was created.
    pub reconnect_count: u64,
    pub average_latency_ms: f64,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Time spent on the current connection; 0 when not connected.
    pub uptime_ms: u64,
}

#[derive(Default)]
struct Counters {
    connect_started: Option<Instant>,
    connected_since: Option<Instant>,
    time_to_connect_ms: Option<u64>,
    messages_received: u64,
    messages_sent: u64,
    reconnect_count: u64,
    last_message_at: Option<DateTime<Utc>>,
    latency: LatencyWindow,
}

/// Shared, mutable counters behind `ConnectionMetrics`.
#[derive(Default)]
pub(crate) struct StreamMetrics {
    counters: Mutex<Counters>,
}

impl StreamMetrics {
    pub fn connect_started(&self) {
        self.counters.lock().connect_started = Some(Instant::now());
    }

    pub fn connected(&self) {
        let mut c = self.counters.lock();
        let now = Instant::now();
        if let Some(started) = c.connect_started.take() {
            c.time_to_connect_ms = Some(now.duration_since(started).as_millis() as u64);
        }
        c.connected_since = Some(now);
    }

    pub fn disconnected(&self) {
        self.counters.lock().connected_since = None;
    }

    pub fn record_received(&self, latency_ms: f64, at: DateTime<Utc>) {
        let mut c = self.counters.lock();
        c.messages_received += 1;
        c.last_message_at = Some(at);
        c.latency.push(latency_ms);
    }

    pub fn record_sent(&self) {
        self.counters.lock().messages_sent += 1;
    }

    pub fn record_reconnect_attempt(&self) {
        self.counters.lock().reconnect_count += 1;
    }

    pub fn snapshot(&self) -> ConnectionMetrics {
        let c = self.counters.lock();
        ConnectionMetrics {
            time_to_connect_ms: c.time_to_connect_ms,
            messages_received: c.messages_received,
            messages_sent: c.messages_sent,
            reconnect_count: c.reconnect_count,
            average_latency_ms: c.latency.average(),
            last_message_at: c.last_message_at,
            uptime_ms: c
                .connected_since
                .map(|since| since.elapsed().as_millis() as u64)
                .unwrap_or(0),
        }
    }
}
