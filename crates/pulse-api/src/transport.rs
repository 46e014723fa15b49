//! HTTP transport abstraction.
//!
//! The request client owns timeouts, retries and validation; a transport
//! only performs one round trip. This allows for:
//! - Dependency injection for testing (`ScriptedTransport`)
//! - Swapping the HTTP stack without touching retry policy

use crate::error::{ApiError, ApiResult, RequestError};
use crate::options::Method;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::pin::Pin;
use tokio::time::Instant;
use tracing::debug;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// One outgoing HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl TransportRequest {
    /// Value of a header (case-insensitive name match).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw HTTP answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Performs a single HTTP round trip.
pub trait HttpTransport: Send + Sync {
    /// Connection-level failures are reported as `RequestError::Transport`.
    fn execute(&self, request: TransportRequest)
        -> BoxFuture<'_, Result<TransportResponse, RequestError>>;
}

/// `reqwest`-backed transport.
///
/// No client-level timeout is configured: the request client applies its
/// own per-attempt budget.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportResponse, RequestError>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(Self::method(request.method), &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| RequestError::transport(format!("HTTP request failed: {e}")))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| RequestError::transport(format!("Failed to read body: {e}")))?;

            Ok(TransportResponse { status, body })
        })
    }
}

/// Scripted reply for `ScriptedTransport`.
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer with status and body.
    Respond(u16, String),
    /// Fail at the connection level.
    Fail(String),
    /// Never answer.
    Hang,
}

/// In-memory transport replaying a script, for tests and offline runs.
///
/// Once the script is exhausted every call fails with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<(Instant, TransportRequest)>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Script>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue another reply.
    pub fn push(&self, step: Script) {
        self.script.lock().push_back(step);
    }

    /// Number of `execute` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.calls.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Times at which each call arrived.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(t, _)| *t).collect()
    }
}

impl HttpTransport for ScriptedTransport {
    fn execute(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportResponse, RequestError>> {
        debug!(url = %request.url, method = %request.method, "Scripted call");
        self.calls.lock().push((Instant::now(), request));
        let step = self.script.lock().pop_front();

        Box::pin(async move {
            match step {
                Some(Script::Respond(status, body)) => Ok(TransportResponse { status, body }),
                Some(Script::Fail(cause)) => Err(RequestError::transport(cause)),
                Some(Script::Hang) => std::future::pending().await,
                None => Err(RequestError::transport("script exhausted")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TransportRequest {
        TransportRequest {
            method: Method::Get,
            url: "http://localhost/api".to_string(),
            headers: vec![("X-Request-ID".to_string(), "abc".to_string())],
            body: None,
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        assert_eq!(request().header("x-request-id"), Some("abc"));
        assert_eq!(request().header("authorization"), None);
    }

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new([
            Script::Fail("refused".to_string()),
            Script::Respond(200, "{}".to_string()),
        ]);

        let first = transport.execute(request()).await;
        assert_eq!(first, Err(RequestError::transport("refused")));

        let second = transport.execute(request()).await.unwrap();
        assert_eq!(second.status, 200);

        assert!(transport.execute(request()).await.is_err());
        assert_eq!(transport.call_count(), 3);
    }
}
