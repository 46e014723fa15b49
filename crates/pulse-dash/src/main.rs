//! pulse dashboard data daemon - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Headless dashboard data daemon
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PULSE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any wss:// connections)
    pulse_ws::init_crypto();

    let args = Args::parse();

    pulse_telemetry::init_logging()?;

    info!("Starting pulse-dash v{}", env!("CARGO_PKG_VERSION"));

    // Determine config path: CLI arg > PULSE_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("PULSE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = pulse_dash::AppConfig::from_file(&config_path)?;
    info!(
        base_url = %config.api.base_url,
        stream_url = %config.stream.url,
        "Configuration loaded"
    );

    let app = pulse_dash::Application::new(config)?;
    app.run().await?;

    Ok(())
}
