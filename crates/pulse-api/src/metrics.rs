//! Per-attempt request metrics.
//!
//! Bounded ring of the most recent samples. Lives only in memory.

use crate::options::Method;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Samples kept before the oldest is evicted.
pub const METRIC_CAPACITY: usize = 1000;

/// One request attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMetricSample {
    pub target: String,
    pub method: Method,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: f64,
    /// `None` when no HTTP answer arrived.
    pub status_code: Option<u16>,
    pub succeeded: bool,
    /// 0 for the first attempt of a call.
    pub retry_count: u32,
    pub correlation_id: String,
}

/// Append-only bounded sample buffer.
pub struct MetricRing {
    capacity: usize,
    samples: Mutex<VecDeque<RequestMetricSample>>,
}

impl Default for MetricRing {
    fn default() -> Self {
        Self::new(METRIC_CAPACITY)
    }
}

impl MetricRing {
    /// A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&self, sample: RequestMetricSample) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    pub fn snapshot(&self) -> Vec<RequestMetricSample> {
        self.samples.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }

    /// Mean `duration_ms` over the retained samples; 0 when empty.
    pub fn average_response_time(&self) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|s| s.duration_ms).sum::<f64>() / samples.len() as f64
    }

    /// `100 * succeeded / total`; 0 when empty.
    pub fn success_rate(&self) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return 0.0;
        }
        let succeeded = samples.iter().filter(|s| s.succeeded).count();
        100.0 * succeeded as f64 / samples.len() as f64
    }
}
