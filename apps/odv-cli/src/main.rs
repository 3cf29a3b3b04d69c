mod app;
mod cli;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use odv_core::AppConfig;
use tracing::{error, info};

use crate::app::App;
use crate::cli::Args;
use crate::telemetry::{effective_settings, init_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let args = Args::parse();

    let config_path = args.config.to_string_lossy().into_owned();
    let config = AppConfig::load_from_file(&config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    let (level, json_logs) = effective_settings(&config.telemetry, args.log_level.as_deref(), args.json_logs);
    init_telemetry(&level, json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), dry_run = args.dry_run, "Starting odv");

    let result = App::new(args, config).run().await;

    if let Err(ref e) = result {
        error!("Command failed: {:#}", e);
    }

    result
}
