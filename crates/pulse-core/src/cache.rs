//! Cache capability handed to the event stream.
//!
//! The event-stream client only knows how to invalidate or overwrite the keys
//! it is told about. It never sees the cache implementation, so it cannot
//! iterate or clear the whole key space.

/// Cache keys shared by the dashboard queries and the cache bridge.
pub mod keys {
    /// Aggregated system metrics.
    pub const METRICS: &str = "metrics";
    /// List of security violations.
    pub const VIOLATIONS: &str = "violations";
    /// Service status list.
    pub const SERVICES: &str = "services";
    /// Circuit breaker states.
    pub const CIRCUIT_BREAKERS: &str = "circuit-breakers";
    /// Prefix of per-violation detail entries.
    pub const VIOLATION_ITEM_PREFIX: &str = "violation";

    /// Key of a single item under a list prefix, e.g. `violation:v-1`.
    pub fn item(prefix: &str, id: &str) -> String {
        format!("{prefix}:{id}")
    }

    /// Key of a single violation's detail entry.
    pub fn violation_item(id: &str) -> String {
        item(VIOLATION_ITEM_PREFIX, id)
    }
}

/// Invalidate / overwrite capability over a query cache.
pub trait CacheHandle: Send + Sync {
    /// Mark the entry stale so the next read refetches it.
    fn invalidate(&self, key: &str);

    /// Replace the entry's value with fresh data.
    fn overwrite(&self, key: &str, value: serde_json::Value);
}

/// Cache handle that ignores every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl CacheHandle for NoopCache {
    fn invalidate(&self, _key: &str) {}

    fn overwrite(&self, _key: &str, _value: serde_json::Value) {}
}
