//! Stale-while-revalidate query cache.
//!
//! The event stream marks entries stale (or overwrites them) through the
//! `CacheHandle` capability; readers go through `read_through`, which refetches
//! stale or missing entries with the request client.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pulse_api::{descriptor_for_key, RequestClient};
use pulse_core::CacheHandle;
use serde_json::Value;
use tracing::{debug, warn};

/// One cached query result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    /// Set by invalidation; cleared when fresh data is stored.
    pub stale: bool,
    pub updated_at: DateTime<Utc>,
}

/// Query results keyed by cache key.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Store fresh data.
    pub fn insert(&self, key: &str, value: Value) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stale: false,
                updated_at: Utc::now(),
            },
        );
    }

    /// Missing entries count as stale.
    pub fn is_stale(&self, key: &str) -> bool {
        self.entries.get(key).map_or(true, |e| e.stale)
    }

    pub fn stale_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.stale)
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch `key` from the API and store the result.
    pub async fn refresh(&self, key: &str, client: &RequestClient) -> AppResult<Value> {
        let descriptor =
            descriptor_for_key(key).ok_or_else(|| AppError::UnknownQuery(key.to_string()))?;
        let outcome = client.request::<Value>(descriptor).await?;
        self.insert(key, outcome.payload.clone());
        debug!(%key, correlation_id = %outcome.correlation_id, "Cache entry refreshed");
        Ok(outcome.payload)
    }

    /// Serve a fresh entry, or refetch. When the refetch fails and a stale
    /// value exists, the stale value is served.
    pub async fn read_through(&self, key: &str, client: &RequestClient) -> AppResult<Value> {
        let cached = self.get(key);
        if let Some(entry) = &cached {
            if !entry.stale {
                return Ok(entry.value.clone());
            }
        }

        match self.refresh(key, client).await {
            Ok(value) => Ok(value),
            Err(e) => match cached {
                Some(entry) => {
                    warn!(%key, error = %e, "Refresh failed, serving stale entry");
                    Ok(entry.value)
                }
                None => Err(e),
            },
        }
    }
}

impl CacheHandle for QueryCache {
    fn invalidate(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.stale = true;
            debug!(%key, "Cache entry invalidated");
        }
    }

    fn overwrite(&self, key: &str, value: Value) {
        self.insert(key, value);
        debug!(%key, "Cache entry overwritten");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_api::{ClientConfig, RequestOptions, Script, ScriptedTransport};
    use pulse_core::{keys, StaticToken};
    use serde_json::json;
    use std::sync::Arc;

    fn envelope(data: Value) -> String {
        json!({
            "data": data,
            "success": true,
            "timestamp": "2024-05-01T12:00:00Z",
            "requestId": "srv"
        })
        .to_string()
    }

    fn client(script: Vec<Script>) -> (RequestClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let config = ClientConfig {
            options: RequestOptions {
                retry_attempts: 0,
                ..RequestOptions::default()
            },
            ..ClientConfig::default()
        };
        let client =
            RequestClient::with_transport(config, transport.clone(), Arc::new(StaticToken::none()));
        (client, transport)
    }

    #[test]
    fn test_invalidate_marks_stale() {
        let cache = QueryCache::new();
        cache.insert(keys::METRICS, json!({"cpu": 0.4}));
        assert!(!cache.is_stale(keys::METRICS));

        cache.invalidate(keys::METRICS);
        assert!(cache.is_stale(keys::METRICS));
        assert_eq!(cache.get(keys::METRICS).unwrap().value, json!({"cpu": 0.4}));
        assert_eq!(cache.stale_keys(), vec![keys::METRICS.to_string()]);
    }

    #[test]
    fn test_invalidate_missing_key_is_noop() {
        let cache = QueryCache::new();
        cache.invalidate(keys::SERVICES);
        assert!(cache.is_empty());
        assert!(cache.is_stale(keys::SERVICES));
    }

    #[test]
    fn test_overwrite_stores_fresh_value() {
        let cache = QueryCache::new();
        cache.insert("violation:v-1", json!({"severity": "low"}));
        cache.invalidate("violation:v-1");

        cache.overwrite("violation:v-1", json!({"severity": "high"}));
        let entry = cache.get("violation:v-1").unwrap();
        assert!(!entry.stale);
        assert_eq!(entry.value, json!({"severity": "high"}));
    }

    #[tokio::test]
    async fn test_read_through_fetches_once_while_fresh() {
        let (client, transport) = client(vec![Script::Respond(200, envelope(json!([1, 2])))]);
        let cache = QueryCache::new();

        assert_eq!(cache.read_through(keys::SERVICES, &client).await.unwrap(), json!([1, 2]));
        assert_eq!(cache.read_through(keys::SERVICES, &client).await.unwrap(), json!([1, 2]));
        assert_eq!(transport.call_count(), 1);
        assert!(transport.requests()[0].url.ends_with("/api/v1/services"));
    }

    #[tokio::test]
    async fn test_read_through_refetches_stale() {
        let (client, transport) = client(vec![
            Script::Respond(200, envelope(json!({"v": 1}))),
            Script::Respond(200, envelope(json!({"v": 2}))),
        ]);
        let cache = QueryCache::new();

        cache.read_through(keys::METRICS, &client).await.unwrap();
        cache.invalidate(keys::METRICS);
        let value = cache.read_through(keys::METRICS, &client).await.unwrap();

        assert_eq!(value, json!({"v": 2}));
        assert_eq!(transport.call_count(), 2);
        assert!(!cache.is_stale(keys::METRICS));
    }

    #[tokio::test]
    async fn test_read_through_serves_stale_on_failure() {
        let (client, _) = client(vec![Script::Fail("connection refused".to_string())]);
        let cache = QueryCache::new();
        cache.insert(keys::VIOLATIONS, json!(["old"]));
        cache.invalidate(keys::VIOLATIONS);

        let value = cache.read_through(keys::VIOLATIONS, &client).await.unwrap();
        assert_eq!(value, json!(["old"]));
        assert!(cache.is_stale(keys::VIOLATIONS));
    }

    #[tokio::test]
    async fn test_read_through_unknown_key() {
        let (client, transport) = client(vec![]);
        let cache = QueryCache::new();

        assert!(matches!(
            cache.read_through("nope", &client).await,
            Err(AppError::UnknownQuery(_))
        ));
        assert_eq!(transport.call_count(), 0);
    }
}
