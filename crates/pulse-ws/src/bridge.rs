//! Cache bridge: turns push notifications into cache actions.
//!
//! The mapping is a static table keyed by event kind, so adding a kind means
//! adding a row rather than a branch.

use pulse_core::{keys, CacheHandle, EventKind, InboundEvent};
use pulse_telemetry::Metrics;
use std::sync::Arc;
use tracing::debug;

/// Write the event payload under a per-item key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemOverwrite {
    /// Payload field holding the item id.
    pub id_field: &'static str,
    /// Key prefix; the entry key is `<prefix>:<id>`.
    pub key_prefix: &'static str,
}

/// Cache actions for one event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRule {
    pub kind: EventKind,
    pub invalidate: &'static [&'static str],
    pub overwrite_item: Option<ItemOverwrite>,
}

pub static CACHE_RULES: [CacheRule; 5] = [
    CacheRule {
        kind: EventKind::MetricsUpdate,
        invalidate: &[keys::METRICS],
        overwrite_item: None,
    },
    CacheRule {
        kind: EventKind::SecurityAlert,
        invalidate: &[keys::VIOLATIONS],
        overwrite_item: Some(ItemOverwrite {
            id_field: "violationId",
            key_prefix: keys::VIOLATION_ITEM_PREFIX,
        }),
    },
    CacheRule {
        kind: EventKind::ServiceStatusChange,
        invalidate: &[keys::SERVICES],
        overwrite_item: None,
    },
    CacheRule {
        kind: EventKind::CircuitBreakerStateChange,
        invalidate: &[keys::CIRCUIT_BREAKERS],
        overwrite_item: None,
    },
    CacheRule {
        kind: EventKind::Heartbeat,
        invalidate: &[],
        overwrite_item: None,
    },
];

pub fn rule_for(kind: EventKind) -> Option<&'static CacheRule> {
    CACHE_RULES.iter().find(|rule| rule.kind == kind)
}

/// Applies `CACHE_RULES` to an injected cache handle.
#[derive(Clone)]
pub struct CacheBridge {
    cache: Arc<dyn CacheHandle>,
}

impl CacheBridge {
    pub fn new(cache: Arc<dyn CacheHandle>) -> Self {
        Self { cache }
    }

    /// Apply the rule for the event's kind. Returns the number of cache
    /// actions performed.
    pub fn apply(&self, event: &InboundEvent) -> usize {
        let Some(rule) = rule_for(event.kind) else {
            return 0;
        };

        let mut actions = 0;
        for key in rule.invalidate {
            self.cache.invalidate(key);
            Metrics::cache_invalidated(key);
            actions += 1;
        }

        if let Some(item) = rule.overwrite_item {
            if let Some(id) = event.payload_str(item.id_field) {
                let key = keys::item(item.key_prefix, id);
                self.cache.overwrite(&key, event.payload.clone());
                actions += 1;
            }
        }

        if actions > 0 {
            debug!(kind = %event.kind, actions, "Applied cache rule");
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockall::mock;
    use mockall::predicate::eq;
    use serde_json::{json, Value};

    mock! {
        pub Cache {}

        impl CacheHandle for Cache {
            fn invalidate(&self, key: &str);
            fn overwrite(&self, key: &str, value: Value);
        }
    }

    fn event(kind: EventKind, payload: Value) -> InboundEvent {
        InboundEvent {
            kind,
            occurred_at: Utc::now(),
            correlation_id: "r-1".to_string(),
            payload,
            protocol_version: "1.0".to_string(),
        }
    }

    #[test]
    fn test_every_kind_has_exactly_one_rule() {
        for kind in EventKind::ALL {
            let rules = CACHE_RULES.iter().filter(|r| r.kind == kind).count();
            assert_eq!(rules, 1, "{kind}");
        }
    }

    #[test]
    fn test_metrics_update_invalidates_metrics() {
        let mut cache = MockCache::new();
        cache
            .expect_invalidate()
            .with(eq(keys::METRICS))
            .times(1)
            .return_const(());

        let bridge = CacheBridge::new(Arc::new(cache));
        assert_eq!(bridge.apply(&event(EventKind::MetricsUpdate, json!({}))), 1);
    }

    #[test]
    fn test_security_alert_invalidates_and_overwrites_item() {
        let payload = json!({"violationId": "v-1", "severity": "high"});
        let mut cache = MockCache::new();
        cache
            .expect_invalidate()
            .with(eq(keys::VIOLATIONS))
            .times(1)
            .return_const(());
        cache
            .expect_overwrite()
            .with(eq("violation:v-1"), eq(payload.clone()))
            .times(1)
            .return_const(());

        let bridge = CacheBridge::new(Arc::new(cache));
        assert_eq!(bridge.apply(&event(EventKind::SecurityAlert, payload)), 2);
    }

    #[test]
    fn test_security_alert_without_id_skips_overwrite() {
        let mut cache = MockCache::new();
        cache
            .expect_invalidate()
            .with(eq(keys::VIOLATIONS))
            .times(1)
            .return_const(());
        cache.expect_overwrite().never();

        let bridge = CacheBridge::new(Arc::new(cache));
        assert_eq!(
            bridge.apply(&event(EventKind::SecurityAlert, json!({"severity": "low"}))),
            1
        );
    }

    #[test]
    fn test_status_changes_invalidate_their_lists() {
        let mut cache = MockCache::new();
        cache
            .expect_invalidate()
            .with(eq(keys::SERVICES))
            .times(1)
            .return_const(());
        cache
            .expect_invalidate()
            .with(eq(keys::CIRCUIT_BREAKERS))
            .times(1)
            .return_const(());

        let bridge = CacheBridge::new(Arc::new(cache));
        bridge.apply(&event(EventKind::ServiceStatusChange, json!({"service": "auth"})));
        bridge.apply(&event(EventKind::CircuitBreakerStateChange, json!({"state": "open"})));
    }

    #[test]
    fn test_heartbeat_touches_nothing() {
        let mut cache = MockCache::new();
        cache.expect_invalidate().never();
        cache.expect_overwrite().never();

        let bridge = CacheBridge::new(Arc::new(cache));
        assert_eq!(bridge.apply(&event(EventKind::Heartbeat, Value::Null)), 0);
    }
}
