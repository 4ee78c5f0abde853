//! # Footfall
//!
//! Binary entry point for the coffee shop site selection runner.

use anyhow::Context;
use clap::Parser;
use footfall_cli::{Cli, Config, LogFormat, Pipeline};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("invalid FOOTFALL_* environment")?;
    cli.apply(&mut config);

    // Initialize tracing; stdout carries the result tables
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();

    tracing::info!(
        version = footfall_cli::VERSION,
        command = ?cli.command,
        counties = ?config.counties.prefixes(),
        metric = %config.distance_metric,
        "Starting footfall"
    );

    let pipeline = Pipeline::open(config, &cli.command)?;
    pipeline.run(&cli.command)?;

    tracing::info!("Done");
    Ok(())
}
