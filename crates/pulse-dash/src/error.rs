//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event stream error: {0}")]
    Stream(#[from] pulse_ws::WsError),

    #[error("API client error: {0}")]
    Api(#[from] pulse_api::ApiError),

    #[error("Request error: {0}")]
    Request(#[from] pulse_api::RequestError),

    #[error("Credential error: {0}")]
    Credentials(#[from] pulse_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] pulse_telemetry::TelemetryError),

    #[error("No query is registered for cache key `{0}`")]
    UnknownQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
