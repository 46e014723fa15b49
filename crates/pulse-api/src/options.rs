//! Request options and descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-wide request policy.
///
/// `timeout_ms` bounds a single attempt. A logical call is not bounded as a
/// whole: it can take the sum of every attempt's timeout plus the backoff
/// delays between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub timeout_ms: u64,
    /// Additional attempts after the first failure.
    pub retry_attempts: u32,
    /// Retry `n` (0-indexed) waits `retry_base_delay_ms * 2^n`.
    pub retry_base_delay_ms: u64,
    /// Ceiling on a single retry delay.
    pub retry_max_delay_ms: u64,
    /// Retry attempts that ran out of time. Off by default.
    pub retry_on_timeout: bool,
    pub enable_metrics: bool,
    pub enable_tracing: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retry_attempts: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            retry_on_timeout: false,
            enable_metrics: true,
            enable_tracing: true,
        }
    }
}

impl RequestOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Apply per-call overrides on top of these options.
    pub fn merged(&self, overrides: &RequestOverrides) -> Self {
        Self {
            timeout_ms: overrides.timeout_ms.unwrap_or(self.timeout_ms),
            retry_attempts: overrides.retry_attempts.unwrap_or(self.retry_attempts),
            retry_base_delay_ms: overrides
                .retry_base_delay_ms
                .unwrap_or(self.retry_base_delay_ms),
            retry_max_delay_ms: overrides
                .retry_max_delay_ms
                .unwrap_or(self.retry_max_delay_ms),
            retry_on_timeout: overrides.retry_on_timeout.unwrap_or(self.retry_on_timeout),
            enable_metrics: overrides.enable_metrics.unwrap_or(self.enable_metrics),
            enable_tracing: overrides.enable_tracing.unwrap_or(self.enable_tracing),
        }
    }
}

/// Per-call overrides; `None` keeps the client-wide value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOverrides {
    pub timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub retry_on_timeout: Option<bool>,
    pub enable_metrics: Option<bool>,
    pub enable_tracing: Option<bool>,
}

/// One logical call: endpoint, method, body and overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// Path relative to the client's base URL.
    pub path: String,
    pub method: Method,
    pub body: Option<serde_json::Value>,
    pub overrides: RequestOverrides,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
            overrides: RequestOverrides::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_overrides(mut self, overrides: RequestOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let opts = RequestOptions::default();
        assert_eq!(opts.timeout_ms, 10_000);
        assert_eq!(opts.retry_attempts, 3);
        assert_eq!(opts.retry_base_delay_ms, 1_000);
        assert!(opts.enable_metrics);
        assert!(opts.enable_tracing);
        assert!(!opts.retry_on_timeout);
    }

    #[test]
    fn test_overrides_only_replace_set_fields() {
        let base = RequestOptions::default();
        let merged = base.merged(&RequestOverrides {
            timeout_ms: Some(500),
            retry_attempts: Some(0),
            ..Default::default()
        });
        assert_eq!(merged.timeout_ms, 500);
        assert_eq!(merged.retry_attempts, 0);
        assert_eq!(merged.retry_base_delay_ms, base.retry_base_delay_ms);
        assert_eq!(merged.enable_tracing, base.enable_tracing);
    }

    #[test]
    fn test_descriptor_builders() {
        let d = RequestDescriptor::post("/api/v1/x", json!({"a": 1}));
        assert_eq!(d.method, Method::Post);
        assert_eq!(d.body, Some(json!({"a": 1})));

        let d = RequestDescriptor::delete("/api/v1/x/1");
        assert_eq!(d.method, Method::Delete);
        assert!(d.body.is_none());
    }
}
