//! Cold-Chain Monitor - Main Entry Point

use api::{config::Settings, init_logging, run_server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::var("MONITOR_CONFIG").unwrap_or_else(|_| "monitor.toml".to_string());
    let settings = Settings::load(&path)?;
    init_logging(&settings.logging).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!("=== Cold-Chain Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Thresholds default to [{}, {}], ceiling {}, debounce {}s",
        settings.thresholds.min_temp,
        settings.thresholds.max_temp,
        settings.incident.max_counter,
        settings.incident.debounce_seconds
    );

    run_server(settings).await?;

    Ok(())
}
