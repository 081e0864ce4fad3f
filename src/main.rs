//! haptic-bridge - game telemetry to haptic controllers
//!
//! ```text
//! haptic-bridge <config.toml>
//! ```
//!
//! Runs until Ctrl-C, then stops the telemetry source and disconnects every
//! controller.

use clap::Parser;
use haptic_bridge::{Config, Manager, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "haptic-bridge", version, about = "Game proximity telemetry to haptic actuators")]
struct Args {
    /// Configuration file
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("haptic-bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", args.config.display());

    let mut manager = Manager::from_config(&config)?;
    log::info!("Actuators: {}", manager.router().names().join(", "));

    if let Err(e) = manager.start().await {
        log::error!("Startup failed: {}", e);
        if let Err(stop_err) = manager.stop().await {
            log::warn!("Cleanup after failed startup: {}", stop_err);
        }
        return Err(e);
    }

    tokio::select! {
        result = manager.run() => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Received shutdown signal"),
    }

    manager.stop().await?;
    log::info!("Shutdown complete");
    Ok(())
}
