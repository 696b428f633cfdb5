//! Federation monitor binary

use anyhow::Context;
use federation_monitor::{Config, MonitorServer};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional first argument overrides the config search paths
    let path = std::env::args_os().nth(1).map(PathBuf::from);

    let config = Config::load(path.as_deref()).context("failed to load configuration")?;

    let level = config.logging.level.as_deref().unwrap_or("info");
    match config.logging.format.as_deref() {
        Some("json") => common::logging::init_json(level),
        _ => common::logging::init(level),
    }

    tracing::info!("Federation monitor starting");

    MonitorServer::new(config)
        .run()
        .await
        .context("federation monitor failed")?;

    Ok(())
}
