//! Feature extraction worker entry point.
//!
//! This binary is the composition root. It:
//!
//! 1. **Parses configuration**: flags, environment and an optional TOML file
//!    (see [`config`]).
//! 2. **Wires logging**: `tracing-subscriber` to stderr (see [`logging`]).
//! 3. **Constructs the worker**: the built-in registry, the module catalog
//!    and the worker settings, started on its own thread.
//! 4. **Bridges the host**: JSON lines on stdin go to the worker, worker
//!    messages come back as JSON lines on stdout (see [`bridge`]).
//!
//! The process exits once stdin is closed and every in-flight request has
//! finished.

mod bridge;
mod catalog;
mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use example_plugins::builtin_registry;
use extraction::Router;
use tokio::io::BufReader;
use tracing::info;
use worker::{spawn_isolated, FeatureExtractionWorker};

use crate::config::{CliConfig, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "feature-worker")]
#[command(about = "Routes analysis requests to extraction libraries over JSON lines")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "FEATURE_WORKER_CONFIG")]
    config: Option<PathBuf>,

    /// Log line format (overrides the config file).
    #[arg(long, value_enum, env = "FEATURE_WORKER_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log filter used when RUST_LOG is unset (overrides the config file).
    #[arg(long, env = "FEATURE_WORKER_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = CliConfig::load_or_default(args.config.as_deref())?;
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    logging::init(&config.logging)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        remote_libraries = config.worker.remote_libraries.len(),
        "Starting feature extraction worker"
    );

    let worker = FeatureExtractionWorker::new(
        Router::new(builtin_registry()),
        Arc::new(catalog::default_catalog()),
        &config.worker,
    );
    let (inbox, outbox, thread) = spawn_isolated(worker, config.worker.outbound_capacity)
        .context("failed to start the worker thread")?
        .into_parts();

    let stats = bridge::run(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        inbox,
        outbox,
    )
    .await
    .context("host bridge failed")?;

    tokio::task::spawn_blocking(move || thread.join())
        .await?
        .map_err(|_| anyhow!("worker thread panicked"))?;

    info!(
        received = stats.received,
        sent = stats.sent,
        "Feature extraction worker stopped"
    );
    Ok(())
}
