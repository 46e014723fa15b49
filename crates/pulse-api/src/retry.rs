//! Retry classification and backoff.

use crate::error::RequestError;
use crate::options::RequestOptions;
use std::time::Duration;

/// Delay before retry `retry_index` (0-indexed): `base * 2^n`, capped at
/// `retry_max_delay_ms`.
pub fn backoff_delay(retry_index: u32, options: &RequestOptions) -> Duration {
    let factor = 1u64.checked_shl(retry_index).unwrap_or(u64::MAX);
    let delay = options
        .retry_base_delay_ms
        .saturating_mul(factor)
        .min(options.retry_max_delay_ms);
    Duration::from_millis(delay)
}

/// Whether a failed attempt may be followed by another one.
pub fn should_retry(error: &RequestError, options: &RequestOptions) -> bool {
    match error {
        RequestError::Protocol { .. } => !error.is_terminal_status(),
        RequestError::Timeout { .. } => options.retry_on_timeout,
        RequestError::Transport { .. } => !error.is_cancelled(),
    }
}
