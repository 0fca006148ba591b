use anyhow::{bail, Context, Result};
use clap::Parser;
use nearshare_daemon::config::Config;
use nearshare_daemon::loopback::LoopbackEngine;
use nearshare_daemon::run_with_engine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// NearShare daemon command-line interface
#[derive(Parser, Debug)]
#[command(name = "nearshare-daemon")]
#[command(about = "NearShare background service", long_about = None)]
#[command(version)]
struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Path to an explicit configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the loopback engine instead of the native transfer engine
    #[arg(long)]
    loopback: bool,
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("Failed to create log filter")?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli).context("Failed to initialize logging")?;

    info!("Starting NearShare daemon v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(cli.config.clone()).context("Failed to load configuration")?;

    // The native engine binding ships separately; this build only
    // carries the loopback development engine.
    if !cli.loopback {
        bail!(
            "no native transfer engine compiled into this build; \
             run with --loopback for the development engine"
        );
    }
    let engine = Arc::new(LoopbackEngine::new());

    let daemon = run_with_engine(config, engine)
        .await
        .context("Failed to start daemon")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    daemon.shutdown().await;
    Ok(())
}
