//! Application configuration.
//!
//! Loaded from a TOML file; any field can be overridden with
//! `PULSE__<SECTION>__<FIELD>` environment variables.

use crate::error::{AppError, AppResult};
use pulse_api::{ClientConfig, RequestOptions};
use pulse_core::CredentialChain;
use pulse_ws::StreamConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identity sent in request headers and stream query parameters.
const CLIENT_NAME: &str = "pulse-dash";

/// REST API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Budget for a single attempt.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Additional attempts after the first failure.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default)]
    pub retry_on_timeout: bool,
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
    #[serde(default = "default_true")]
    pub enable_tracing: bool,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_on_timeout: false,
            enable_metrics: true,
            enable_tracing: true,
        }
    }
}

impl ApiSection {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            client_name: CLIENT_NAME.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            options: RequestOptions {
                timeout_ms: self.timeout_ms,
                retry_attempts: self.retry_attempts,
                retry_base_delay_ms: self.retry_base_delay_ms,
                retry_max_delay_ms: self.retry_max_delay_ms,
                retry_on_timeout: self.retry_on_timeout,
                enable_metrics: self.enable_metrics,
                enable_tracing: self.enable_tracing,
            },
        }
    }
}

/// Event stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSection {
    #[serde(default = "default_stream_url")]
    pub url: String,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_stream_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl StreamSection {
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            url: self.url.clone(),
            client_name: CLIENT_NAME.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            reconnect_attempts: self.reconnect_attempts,
            reconnect_delay_ms: self.reconnect_delay_ms,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            ..StreamConfig::default()
        }
    }
}

/// Where the bearer token comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    /// Persisted token, checked first.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// Environment variable checked when the file yields nothing.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_token_env() -> String {
    "PULSE_API_TOKEN".to_string()
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            token_file: None,
            token_env: default_token_env(),
        }
    }
}

impl AuthSection {
    pub fn credentials(&self) -> CredentialChain {
        CredentialChain::standard(self.token_file.as_deref(), &self.token_env)
    }
}

/// Dashboard loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSection {
    /// How often stale queries are refetched.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// How often client metrics are written to the log.
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
}

fn default_refresh_interval_ms() -> u64 {
    15_000
}

fn default_report_interval_ms() -> u64 {
    60_000
}

impl Default for DashboardSection {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            report_interval_ms: default_report_interval_ms(),
        }
    }
}

impl DashboardSection {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub dashboard: DashboardSection,
}

impl AppConfig {
    /// Load a TOML file overlaid with `PULSE__*` environment variables.
    pub fn from_file(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            return Err(AppError::Config(format!("Config file not found: {path}")));
        }

        let config: Self = config::Config::builder()
            .add_source(config::File::from(Path::new(path)))
            .add_source(
                config::Environment::with_prefix("PULSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AppError::Config(format!("Failed to load config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without consulting the environment.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "api.base_url must be http(s): {}",
                self.api.base_url
            )));
        }
        if !self.stream.url.starts_with("ws://") && !self.stream.url.starts_with("wss://") {
            return Err(AppError::Config(format!(
                "stream.url must be ws(s): {}",
                self.stream.url
            )));
        }
        if self.dashboard.refresh_interval_ms == 0 || self.dashboard.report_interval_ms == 0 {
            return Err(AppError::Config(
                "dashboard intervals must be positive".to_string(),
            ));
        }
        if self.api.retry_max_delay_ms < self.api.retry_base_delay_ms {
            return Err(AppError::Config(
                "api.retry_max_delay_ms must not be below api.retry_base_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
