//! Correlation identifiers.
//!
//! A fresh id is minted for every request attempt and every outbound stream
//! message, so retries of one logical call never share an id.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier tying one attempt (or one message) to its logs and server records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trace id attached to outgoing requests when tracing is enabled.
pub fn trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}
