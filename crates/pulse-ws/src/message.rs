//! Stream frame types and parsing.
//!
//! Every frame is a JSON object:
//! `{"type", "data", "timestamp", "requestId", "version"?}`.

use chrono::{DateTime, Utc};
use pulse_core::{CorrelationId, EventKind, InboundEvent};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Protocol version stamped on outbound frames and assumed for inbound
/// frames that omit it.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Type of the frame answering a server heartbeat.
pub const HEARTBEAT_ACK_TYPE: &str = "heartbeat_ack";

/// Why an inbound frame was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame is not JSON: {0}")]
    NotJson(String),

    #[error("frame is not a JSON object")]
    NotObject,

    #[error("frame is missing `{0}`")]
    MissingField(&'static str),

    #[error("unknown event type `{0}`")]
    UnknownKind(String),

    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),
}

impl FrameError {
    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotJson(_) | Self::NotObject => "malformed",
            Self::MissingField(_) => "missing_field",
            Self::UnknownKind(_) => "unknown_type",
            Self::InvalidTimestamp(_) => "invalid_timestamp",
        }
    }
}

/// Validate an inbound text frame.
///
/// `type`, `timestamp` and `requestId` are required; `data` defaults to null.
pub fn parse_frame(text: &str) -> Result<InboundEvent, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(|e| FrameError::NotJson(e.to_string()))?;
    let object = value.as_object().ok_or(FrameError::NotObject)?;

    let required = |field: &'static str| {
        object
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(FrameError::MissingField(field))
    };
    let kind_name = required("type")?;
    let timestamp = required("timestamp")?;
    let request_id = required("requestId")?;

    let kind: EventKind = kind_name
        .parse()
        .map_err(|_| FrameError::UnknownKind(kind_name.to_string()))?;
    let occurred_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| FrameError::InvalidTimestamp(timestamp.to_string()))?
        .with_timezone(&Utc);

    Ok(InboundEvent {
        kind,
        occurred_at,
        correlation_id: request_id.to_string(),
        payload: object.get("data").cloned().unwrap_or(Value::Null),
        protocol_version: object
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION)
            .to_string(),
    })
}

/// Message waiting to be written to the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub kind: String,
    pub data: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundFrame<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a Value,
    timestamp: String,
    request_id: CorrelationId,
    version: &'static str,
}

impl OutboundMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Client heartbeat.
    pub fn heartbeat() -> Self {
        Self::new(EventKind::Heartbeat.as_str(), json!({}))
    }

    /// Reply to a server heartbeat.
    pub fn heartbeat_ack(peer_request_id: &str) -> Self {
        Self::new(HEARTBEAT_ACK_TYPE, json!({ "ackFor": peer_request_id }))
    }

    /// Serialize with a fresh request id and the current time.
    pub fn encode(&self) -> serde_json::Result<String> {
        self.encode_at(Utc::now())
    }

    fn encode_at(&self, now: DateTime<Utc>) -> serde_json::Result<String> {
        serde_json::to_string(&OutboundFrame {
            kind: &self.kind,
            data: &self.data,
            timestamp: now.to_rfc3339(),
            request_id: CorrelationId::new(),
            version: PROTOCOL_VERSION,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_frame() {
        let text = r#"{"type":"security_alert","data":{"violationId":"v-1"},"timestamp":"2024-05-01T12:00:00.250Z","requestId":"r-1","version":"2.0"}"#;
        let event = parse_frame(text).unwrap();

        assert_eq!(event.kind, EventKind::SecurityAlert);
        assert_eq!(event.correlation_id, "r-1");
        assert_eq!(event.payload_str("violationId"), Some("v-1"));
        assert_eq!(event.protocol_version, "2.0");
        assert_eq!(event.occurred_at.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_parse_defaults() {
        let text = r#"{"type":"heartbeat","timestamp":"2024-05-01T12:00:00Z","requestId":"r-2"}"#;
        let event = parse_frame(text).unwrap();

        assert!(event.is_heartbeat());
        assert_eq!(event.payload, Value::Null);
        assert_eq!(event.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_missing_required_fields() {
        let cases = [
            (r#"{"timestamp":"2024-05-01T12:00:00Z","requestId":"r"}"#, "type"),
            (r#"{"type":"metrics_update","requestId":"r"}"#, "timestamp"),
            (r#"{"type":"metrics_update","timestamp":"2024-05-01T12:00:00Z"}"#, "requestId"),
            (r#"{"type":"metrics_update","timestamp":"2024-05-01T12:00:00Z","requestId":""}"#, "requestId"),
        ];
        for (text, field) in cases {
            assert_eq!(parse_frame(text), Err(FrameError::MissingField(field)), "{text}");
        }
    }

    #[test]
    fn test_rejects_unknown_kind_and_garbage() {
        let unknown = r#"{"type":"price_tick","timestamp":"2024-05-01T12:00:00Z","requestId":"r"}"#;
        assert_eq!(
            parse_frame(unknown),
            Err(FrameError::UnknownKind("price_tick".to_string()))
        );

        let bad_ts = r#"{"type":"heartbeat","timestamp":"yesterday","requestId":"r"}"#;
        assert_eq!(parse_frame(bad_ts).unwrap_err().reason(), "invalid_timestamp");

        assert_eq!(parse_frame("[1,2]"), Err(FrameError::NotObject));
        assert_eq!(parse_frame("not json").unwrap_err().reason(), "malformed");
    }

    #[test]
    fn test_encode_outbound_frame() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let text = OutboundMessage::new("subscribe", json!({"topic": "alerts"}))
            .encode_at(now)
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["data"]["topic"], "alerts");
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00+00:00");
        assert_eq!(value["version"], PROTOCOL_VERSION);
        assert_eq!(value["requestId"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn test_each_encode_mints_request_id() {
        let msg = OutboundMessage::heartbeat();
        let a: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        let b: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(a["type"], "heartbeat");
        assert_ne!(a["requestId"], b["requestId"]);
    }

    #[test]
    fn test_heartbeat_ack_references_peer() {
        let ack = OutboundMessage::heartbeat_ack("srv-42");
        assert_eq!(ack.kind, HEARTBEAT_ACK_TYPE);
        assert_eq!(ack.data["ackFor"], "srv-42");
    }
}
