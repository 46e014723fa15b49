//! Core domain types for the pulse dashboard data layer.
//!
//! Shared by the request client, the event-stream client and the
//! presentation-facing cache:
//! - `EventKind`, `InboundEvent`: push notifications from the event stream
//! - `CorrelationId`: per-attempt / per-message identifiers
//! - `CacheHandle`: the capability the event stream uses to invalidate cached queries
//! - `CredentialSource`: pluggable bearer token lookup

pub mod cache;
pub mod correlation;
pub mod credentials;
pub mod error;
pub mod event;

pub use cache::{keys, CacheHandle, NoopCache};
pub use correlation::{trace_id, CorrelationId};
pub use credentials::{CredentialChain, CredentialSource, EnvToken, StaticToken, TokenFile};
pub use error::{CoreError, Result};
pub use event::{EventKind, InboundEvent};
