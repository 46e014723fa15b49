//! Resilient request client.
//!
//! One logical call runs its attempts strictly in sequence; separate calls
//! run fully concurrently. Each attempt gets a fresh correlation id, its own
//! timeout budget and one metric sample.

use crate::envelope::{self, RequestOutcome};
use crate::error::{ApiError, ApiResult, RequestError};
use crate::metrics::{MetricRing, RequestMetricSample};
use crate::options::{RequestDescriptor, RequestOptions};
use crate::retry;
use crate::transport::{HttpTransport, ReqwestTransport, TransportRequest};
use chrono::Utc;
use dashmap::DashMap;
use pulse_core::{trace_id, CorrelationId, CredentialSource};
use pulse_telemetry::Metrics;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const HEADER_REQUEST_ID: &str = "X-Request-ID";
pub const HEADER_TRACE_ID: &str = "X-Trace-ID";
pub const HEADER_CLIENT_NAME: &str = "X-Client-Name";
pub const HEADER_CLIENT_VERSION: &str = "X-Client-Version";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every descriptor path is resolved against.
    pub base_url: String,
    pub client_name: String,
    pub client_version: String,
    pub options: RequestOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            client_name: "pulse-dash".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            options: RequestOptions::default(),
        }
    }
}

/// Request client with retry, timeout, metrics and cancellation.
pub struct RequestClient {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialSource>,
    metrics: MetricRing,
    /// Cancellation tokens of calls that have not finished yet.
    in_flight: DashMap<u64, CancellationToken>,
    next_call_id: AtomicU64,
}

/// Removes a call from the in-flight registry when it finishes.
struct InFlightGuard<'a> {
    registry: &'a DashMap<u64, CancellationToken>,
    call_id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.call_id);
    }
}

impl RequestClient {
    /// Create a client backed by `reqwest`.
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialSource>) -> ApiResult<Self> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(ApiError::InvalidBaseUrl(config.base_url));
        }
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_transport(config, transport, credentials))
    }

    /// Create a client over an arbitrary transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            config,
            transport,
            credentials,
            metrics: MetricRing::default(),
            in_flight: DashMap::new(),
            next_call_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run one logical call.
    ///
    /// # Errors
    ///
    /// - `Protocol`: non-2xx answer or malformed envelope (401/403/404 are never retried)
    /// - `Timeout`: an attempt exceeded its budget (not retried unless `retry_on_timeout`)
    /// - `Transport`: connection failure after retries, or the call was cancelled
    pub async fn request<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<RequestOutcome<T>, RequestError> {
        let options = self.config.options.merged(&descriptor.overrides);
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.in_flight.insert(call_id, token.clone());
        let _guard = InFlightGuard {
            registry: &self.in_flight,
            call_id,
        };

        let url = self.url_for(&descriptor.path);
        let mut last_error = None;

        for attempt in 0..=options.retry_attempts {
            if attempt > 0 {
                let delay = retry::backoff_delay(attempt - 1, &options);
                warn!(
                    method = %descriptor.method,
                    path = %descriptor.path,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying request"
                );
                Metrics::request_retry(descriptor.method.as_str());

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = token.cancelled() => return Err(RequestError::cancelled()),
                }
            }

            match self
                .attempt::<T>(&descriptor, &url, &options, attempt, &token)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(e) if !retry::should_retry(&e, &options) => {
                    debug!(error = %e, attempt, "Request failed without retry");
                    return Err(e);
                }
                Err(e) => {
                    debug!(error = %e, attempt, "Request attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| RequestError::transport("no attempt made"));
        warn!(
            method = %descriptor.method,
            path = %descriptor.path,
            error = %error,
            "Request failed after exhausting retries"
        );
        Err(error)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<RequestOutcome<T>, RequestError> {
        self.request(RequestDescriptor::get(path)).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<RequestOutcome<T>, RequestError> {
        self.request(RequestDescriptor::post(path, body)).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<RequestOutcome<T>, RequestError> {
        self.request(RequestDescriptor::put(path, body)).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<RequestOutcome<T>, RequestError> {
        self.request(RequestDescriptor::delete(path)).await
    }

    /// Abort every in-flight call. Each resolves to a `Transport` error.
    ///
    /// Returns the number of calls cancelled.
    pub fn cancel_all_requests(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.in_flight.iter() {
            entry.value().cancel();
            cancelled += 1;
        }
        if cancelled > 0 {
            info!(cancelled, "Cancelled in-flight requests");
        }
        cancelled
    }

    /// Calls that have started but not finished.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Snapshot of the retained attempt samples.
    pub fn metrics(&self) -> Vec<RequestMetricSample> {
        self.metrics.snapshot()
    }

    pub fn average_response_time(&self) -> f64 {
        self.metrics.average_response_time()
    }

    pub fn success_rate(&self) -> f64 {
        self.metrics.success_rate()
    }

    pub fn clear_metrics(&self) {
        self.metrics.clear();
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
        url: &str,
        options: &RequestOptions,
        attempt: u32,
        token: &CancellationToken,
    ) -> Result<RequestOutcome<T>, RequestError> {
        let correlation_id = CorrelationId::new();
        let request = TransportRequest {
            method: descriptor.method,
            url: url.to_string(),
            headers: self.headers(&correlation_id, options),
            body: descriptor.body.clone(),
        };

        let started_at = Utc::now();
        let start = Instant::now();

        let raw = tokio::select! {
            r = tokio::time::timeout(options.timeout(), self.transport.execute(request)) => {
                r.unwrap_or(Err(RequestError::Timeout { budget_ms: options.timeout_ms }))
            }
            () = token.cancelled() => Err(RequestError::cancelled()),
        };

        let (status_code, result) = match raw {
            Ok(response) => (
                Some(response.status),
                envelope::decode::<T>(&response, correlation_id.as_str()),
            ),
            Err(e) => (None, Err(e)),
        };

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        let succeeded = result.is_ok();

        if options.enable_metrics {
            self.metrics.push(RequestMetricSample {
                target: descriptor.path.clone(),
                method: descriptor.method,
                started_at,
                finished_at: Utc::now(),
                duration_ms,
                status_code,
                succeeded,
                retry_count: attempt,
                correlation_id: correlation_id.to_string(),
            });
            let outcome = match &result {
                Ok(_) => "success",
                Err(e) => e.outcome_label(),
            };
            Metrics::request_attempt(descriptor.method.as_str(), outcome, duration_ms);
        }

        debug!(
            method = %descriptor.method,
            path = %descriptor.path,
            correlation_id = %correlation_id,
            attempt,
            status = ?status_code,
            duration_ms,
            "Request attempt finished"
        );

        result
    }

    fn headers(
        &self,
        correlation_id: &CorrelationId,
        options: &RequestOptions,
    ) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (HEADER_REQUEST_ID.to_string(), correlation_id.to_string()),
        ];
        if let Some(token) = self.credentials.bearer_token() {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        if options.enable_tracing {
            headers.push((HEADER_TRACE_ID.to_string(), trace_id()));
            headers.push((HEADER_CLIENT_NAME.to_string(), self.config.client_name.clone()));
            headers.push((
                HEADER_CLIENT_VERSION.to_string(),
                self.config.client_version.clone(),
            ));
        }
        headers
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
