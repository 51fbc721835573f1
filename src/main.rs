use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use filter_sync::config::Config;
use filter_sync::gateway::FileGateway;
use filter_sync::init::{setup_logging, Runtime};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load Config
    let config_path = std::env::args().nth(1).unwrap_or("config.toml".to_string());
    let config_found = std::path::Path::new(&config_path).exists();
    let config = if config_found {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    // 2. Setup Logging
    setup_logging(&config);
    info!("Starting filter-sync...");
    if !config_found {
        info!("Config file not found, using defaults.");
    }

    // 3. Open persisted state
    let gateway = Arc::new(FileGateway::open(&config.storage.path).await?);
    info!("State file: {}", gateway.path().display());

    // 4. Start the coordinator
    let runtime = Runtime::launch(config, gateway).await?;

    // 5. Graceful Shutdown
    signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    runtime.shutdown().await;

    Ok(())
}
