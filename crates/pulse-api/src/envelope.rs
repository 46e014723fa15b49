//! Response envelope validation.
//!
//! Only the envelope shape is checked here: a boolean `success`, an RFC 3339
//! `timestamp` and a string `requestId`. Whether `data` makes sense for a
//! given endpoint is the caller's concern.

use crate::error::RequestError;
use crate::transport::TransportResponse;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Protocol version assumed when the server omits `version`.
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0";

/// Longest raw body excerpt carried in an error detail.
const DETAIL_EXCERPT_LEN: usize = 200;

/// Successful, validated result of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOutcome<T> {
    pub payload: T,
    /// Always true: only a 2xx response with a valid envelope becomes an outcome.
    pub succeeded: bool,
    /// The envelope's own `success` flag, kept as reported.
    pub server_success: bool,
    pub server_message: Option<String>,
    pub issued_at: DateTime<Utc>,
    /// Id of the attempt that produced this outcome.
    pub correlation_id: String,
    pub schema_version: String,
}

/// Turn a raw response into an outcome, or classify it as a protocol error.
pub fn decode<T: DeserializeOwned>(
    response: &TransportResponse,
    correlation_id: &str,
) -> Result<RequestOutcome<T>, RequestError> {
    if !(200..300).contains(&response.status) {
        return Err(error_from_body(response, correlation_id));
    }

    let invalid = |detail: String| RequestError::Protocol {
        status_code: response.status,
        error_code: RequestError::INVALID_RESPONSE.to_string(),
        correlation_id: correlation_id.to_string(),
        detail,
    };

    let value: Value = serde_json::from_str(&response.body)
        .map_err(|e| invalid(format!("body is not JSON: {e}")))?;

    let server_success = value
        .get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| invalid("missing boolean `success`".to_string()))?;
    let timestamp = value
        .get("timestamp")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing string `timestamp`".to_string()))?;
    let issued_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| invalid(format!("`timestamp` is not ISO-8601: {e}")))?
        .with_timezone(&Utc);
    if value.get("requestId").and_then(Value::as_str).is_none() {
        return Err(invalid("missing string `requestId`".to_string()));
    }

    let payload: T = serde_json::from_value(value.get("data").cloned().unwrap_or(Value::Null))
        .map_err(|e| invalid(format!("`data` does not match the expected shape: {e}")))?;

    Ok(RequestOutcome {
        payload,
        succeeded: true,
        server_success,
        server_message: value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        issued_at,
        correlation_id: correlation_id.to_string(),
        schema_version: value
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SCHEMA_VERSION)
            .to_string(),
    })
}

/// Build a protocol error from a non-2xx response.
///
/// Understands `{"error": {"code", "message"}}` and flat `{"code", "message"}`
/// bodies; anything else falls back to `HTTP_<status>` and a body excerpt.
fn error_from_body(response: &TransportResponse, correlation_id: &str) -> RequestError {
    let body: Option<Value> = serde_json::from_str(&response.body).ok();
    let field = |name: &str| -> Option<String> {
        let body = body.as_ref()?;
        body.get("error")
            .and_then(|e| e.get(name))
            .or_else(|| body.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let error_code = field("code").unwrap_or_else(|| format!("HTTP_{}", response.status));
    let detail = field("message").unwrap_or_else(|| {
        let excerpt: String = response.body.chars().take(DETAIL_EXCERPT_LEN).collect();
        if excerpt.is_empty() {
            format!("HTTP {}", response.status)
        } else {
            excerpt
        }
    });
    let correlation_id = body
        .as_ref()
        .and_then(|b| b.get("requestId"))
        .and_then(Value::as_str)
        .unwrap_or(correlation_id)
        .to_string();

    RequestError::Protocol {
        status_code: response.status,
        error_code,
        correlation_id,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn response(status: u16, body: Value) -> TransportResponse {
        TransportResponse {
            status,
            body: body.to_string(),
        }
    }

    fn envelope(data: Value) -> Value {
        json!({
            "data": data,
            "success": true,
            "message": "ok",
            "timestamp": "2024-05-01T12:00:00Z",
            "requestId": "srv-1",
            "version": "2.1"
        })
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Service {
        name: String,
    }

    #[test]
    fn test_valid_envelope() {
        let outcome: RequestOutcome<Vec<Service>> =
            decode(&response(200, envelope(json!([{"name": "auth"}]))), "c-1").unwrap();

        assert!(outcome.succeeded);
        assert!(outcome.server_success);
        assert_eq!(outcome.payload, vec![Service { name: "auth".into() }]);
        assert_eq!(outcome.server_message.as_deref(), Some("ok"));
        assert_eq!(outcome.correlation_id, "c-1");
        assert_eq!(outcome.schema_version, "2.1");
        assert_eq!(outcome.issued_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_missing_fields_are_invalid_response() {
        for field in ["success", "timestamp", "requestId"] {
            let mut body = envelope(json!({}));
            body.as_object_mut().unwrap().remove(field);
            let err = decode::<Value>(&response(200, body), "c-1").unwrap_err();
            match err {
                RequestError::Protocol {
                    status_code,
                    error_code,
                    ..
                } => {
                    assert_eq!(status_code, 200);
                    assert_eq!(error_code, RequestError::INVALID_RESPONSE);
                }
                other => panic!("expected protocol error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_wrong_types_are_invalid_response() {
        let mut body = envelope(json!({}));
        body["success"] = json!("yes");
        assert!(decode::<Value>(&response(200, body), "c").is_err());

        let err = decode::<Value>(
            &TransportResponse {
                status: 200,
                body: "<html>".to_string(),
            },
            "c",
        )
        .unwrap_err();
        assert!(err.to_string().contains(RequestError::INVALID_RESPONSE));
    }

    #[test]
    fn test_server_failure_flag_does_not_fail_valid_envelope() {
        let mut body = envelope(Value::Null);
        body["success"] = json!(false);
        let outcome = decode::<Value>(&response(200, body), "c").unwrap();
        assert!(outcome.succeeded);
        assert!(!outcome.server_success);
    }

    #[test]
    fn test_missing_version_defaults() {
        let mut body = envelope(Value::Null);
        body.as_object_mut().unwrap().remove("version");
        let outcome = decode::<Value>(&response(200, body), "c").unwrap();
        assert_eq!(outcome.schema_version, DEFAULT_SCHEMA_VERSION);
    }

    #[test]
    fn test_error_body_nested_and_flat() {
        let nested = json!({"error": {"code": "FORBIDDEN", "message": "no access"}, "requestId": "srv-9"});
        match decode::<Value>(&response(403, nested), "c-1").unwrap_err() {
            RequestError::Protocol {
                status_code,
                error_code,
                correlation_id,
                detail,
            } => {
                assert_eq!(status_code, 403);
                assert_eq!(error_code, "FORBIDDEN");
                assert_eq!(correlation_id, "srv-9");
                assert_eq!(detail, "no access");
            }
            other => panic!("unexpected {other:?}"),
        }

        let flat = json!({"code": "BUSY", "message": "try later"});
        let err = decode::<Value>(&response(503, flat), "c-1").unwrap_err();
        assert_eq!(err.status_code(), Some(503));
        assert!(err.to_string().contains("BUSY"));
    }

    #[test]
    fn test_error_body_not_json() {
        let err = decode::<Value>(
            &TransportResponse {
                status: 502,
                body: "Bad Gateway".to_string(),
            },
            "c-1",
        )
        .unwrap_err();
        match err {
            RequestError::Protocol {
                error_code, detail, correlation_id, ..
            } => {
                assert_eq!(error_code, "HTTP_502");
                assert_eq!(detail, "Bad Gateway");
                assert_eq!(correlation_id, "c-1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
