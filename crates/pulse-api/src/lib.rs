//! Resilient request client for the pulse dashboard API.
//!
//! Every call goes through `RequestClient::request`:
//! - Per-attempt timeout
//! - Bounded retry with capped exponential backoff (no retry on 401/403/404)
//! - Envelope validation of successful responses
//! - Per-attempt metric samples in a bounded ring (last 1000)
//! - `cancel_all_requests()` aborting every in-flight call

pub mod client;
pub mod endpoints;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod options;
pub mod retry;
pub mod transport;

pub use client::{ClientConfig, RequestClient};
pub use endpoints::{descriptor_for_key, DashboardApi, DashboardQuery, DASHBOARD_QUERIES};
pub use envelope::RequestOutcome;
pub use error::{ApiError, ApiResult, RequestError};
pub use metrics::{MetricRing, RequestMetricSample, METRIC_CAPACITY};
pub use options::{Method, RequestDescriptor, RequestOptions, RequestOverrides};
pub use transport::{
    BoxFuture, HttpTransport, ReqwestTransport, Script, ScriptedTransport, TransportRequest,
    TransportResponse,
};
