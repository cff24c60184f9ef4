//! steel - partitioned, versioned blob store over RESP
//!
//! Usage:
//!   steel [--config <CONFIG>] [--bind <ADDR>] [--log-level <LEVEL>]
//!
//! Example:
//!   steel --config /etc/steel.toml

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;
use std::sync::Arc;
use steel::config::Config;
use steel::dispatch::Dispatcher;
use steel::server::BlobServer;

#[derive(Parser, Debug)]
#[command(name = "steel")]
#[command(about = "Partitioned blob store with versioned history", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the configuration (e.g., 127.0.0.1:8390)
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    // Initialize logging; RUST_LOG applies when no level was configured
    match (&args.log_level, &args.config) {
        (Some(level), _) => env_logger::Builder::new()
            .filter_level(parse_log_level(level))
            .init(),
        (None, Some(_)) => env_logger::Builder::new()
            .filter_level(parse_log_level(&config.server.log_level))
            .init(),
        (None, None) => {
            env_logger::Builder::from_env(Env::default().default_filter_or("info")).init()
        }
    }

    log::info!("steel v{}", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => log::info!("Loaded configuration from {}", path.display()),
        None => log::info!("No configuration file, using defaults"),
    }

    let registry = config
        .open_partitions()
        .context("failed to open partitions")?;
    log::info!(
        "Configured {} partition(s), strategy {:?}",
        registry.len(),
        registry.strategy()
    );

    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), config.fanout_timeout()));
    let server = BlobServer::bind(&config.server.bind, dispatcher)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    server.run().await.context("server error")?;

    Ok(())
}

/// Parse log level string
fn parse_log_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => {
            eprintln!("Unknown log level '{}', defaulting to 'info'", level);
            log::LevelFilter::Info
        }
    }
}
