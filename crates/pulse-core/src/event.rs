//! Push notifications delivered by the event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Kind of an inbound stream event (`type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MetricsUpdate,
    SecurityAlert,
    ServiceStatusChange,
    CircuitBreakerStateChange,
    Heartbeat,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 5] = [
        Self::MetricsUpdate,
        Self::SecurityAlert,
        Self::ServiceStatusChange,
        Self::CircuitBreakerStateChange,
        Self::Heartbeat,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MetricsUpdate => "metrics_update",
            Self::SecurityAlert => "security_alert",
            Self::ServiceStatusChange => "service_status_change",
            Self::CircuitBreakerStateChange => "circuit_breaker_state_change",
            Self::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::UnknownEventKind(s.to_string()))
    }
}

/// A structurally valid inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub kind: EventKind,
    /// Sender-side timestamp.
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: String,
    /// Opaque to the transport.
    pub payload: serde_json::Value,
    pub protocol_version: String,
}

impl InboundEvent {
    pub fn is_heartbeat(&self) -> bool {
        self.kind == EventKind::Heartbeat
    }

    /// Milliseconds from the sender's timestamp to `received_at`.
    ///
    /// Clock skew between the two peers is folded into the result, so this is
    /// an approximation of delivery delay, not a round-trip time. It can be
    /// negative when the sender's clock runs ahead.
    pub fn latency_ms(&self, received_at: DateTime<Utc>) -> f64 {
        (received_at - self.occurred_at).num_microseconds().unwrap_or(i64::MAX) as f64 / 1000.0
    }

    /// String field of the payload, if present.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn event(kind: EventKind) -> InboundEvent {
        InboundEvent {
            kind,
            occurred_at: Utc::now(),
            correlation_id: "req-1".to_string(),
            payload: json!({"violationId": "v-1"}),
            protocol_version: "1.0".to_string(),
        }
    }

    #[test]
    fn test_kind_wire_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!("order_update".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_latency_includes_skew() {
        let mut e = event(EventKind::MetricsUpdate);
        let received = e.occurred_at + Duration::milliseconds(250);
        assert_eq!(e.latency_ms(received), 250.0);

        // Sender clock ahead of ours
        e.occurred_at = received + Duration::milliseconds(40);
        assert_eq!(e.latency_ms(received), -40.0);
    }

    #[test]
    fn test_payload_str() {
        let e = event(EventKind::SecurityAlert);
        assert_eq!(e.payload_str("violationId"), Some("v-1"));
        assert_eq!(e.payload_str("missing"), None);
        assert!(!e.is_heartbeat());
        assert!(event(EventKind::Heartbeat).is_heartbeat());
    }
}
