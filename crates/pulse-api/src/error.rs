//! Request client error types.

use thiserror::Error;

/// Cause reported for calls aborted by `cancel_all_requests()`.
pub const CANCELLED_CAUSE: &str = "request cancelled";

/// Failure of one logical request. Exactly one kind is produced per failed call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The server rejected the call or answered with a malformed envelope.
    #[error("Protocol error: HTTP {status_code} {error_code}: {detail} (request {correlation_id})")]
    Protocol {
        status_code: u16,
        error_code: String,
        correlation_id: String,
        detail: String,
    },

    /// Connection-level failure (DNS, refused, reset, cancelled).
    #[error("Transport error: {cause}")]
    Transport { cause: String },

    /// The attempt exceeded its time budget.
    #[error("Request timed out after {budget_ms}ms")]
    Timeout { budget_ms: u64 },
}

impl RequestError {
    /// Reserved error code for 2xx responses failing envelope validation.
    pub const INVALID_RESPONSE: &'static str = "INVALID_RESPONSE";

    pub fn transport(cause: impl Into<String>) -> Self {
        Self::Transport {
            cause: cause.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::transport(CANCELLED_CAUSE)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transport { cause } if cause == CANCELLED_CAUSE)
    }

    /// HTTP status, when the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Protocol { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// 401, 403 or 404: retrying cannot change the answer.
    pub fn is_terminal_status(&self) -> bool {
        matches!(self.status_code(), Some(401 | 403 | 404))
    }

    /// Label used for attempt metrics.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Protocol { .. } => "protocol_error",
            Self::Transport { .. } => "transport_error",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Client construction errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

pub type ApiResult<T> = Result<T, ApiError>;
