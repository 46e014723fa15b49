//! Headless dashboard data daemon.
//!
//! Wires the components together:
//! - Request client for the dashboard REST queries
//! - Event stream for push notifications
//! - Query cache invalidated by the stream and refilled by the client
//! - Periodic refresh and metric reports

pub mod app;
pub mod config;
pub mod error;
pub mod query_cache;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use query_cache::{CacheEntry, QueryCache};
