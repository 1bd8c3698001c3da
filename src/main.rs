// Vigil - runtime verification for concurrent message-passing programs
//
// Binary entry point: parses the CLI, loads configuration, initializes
// logging and drives the demo target. The verification machinery itself
// lives in the library crate.

mod cli;
mod demo;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vigil::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Config management needs no runtime setup; handle it and exit early
    if let Some(Commands::Config { show, path, reset }) = &args.command {
        cli::handle_config(*show, *path, *reset);
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();
    let config = Config::from_env();

    // Precedence: RUST_LOG env var > config file > default "info"
    let default_filter = format!("vigil={}", config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let analysis = match &args.command {
        Some(Commands::Demo { external: true }) => vigil::AnalysisMode::External,
        _ => config.analysis,
    };

    tracing::info!(version = vigil::config::VERSION, ?analysis, "vigil starting");
    demo::run_demo(config, analysis).await
}
