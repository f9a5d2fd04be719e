//! visitsync: copies analytics sessions onto application user records.
//!
//! `run` performs one sync, `serve` keeps syncing on a fixed cadence, `check`
//! probes every dependency and `watermark` prints the persisted sync state.

mod commands;
mod context;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use visitsync_core::config::{
    ConfigSource, EnvConfigSource, JsonFileConfigSource, LayeredConfigSource, SyncConfig,
};

use crate::context::ServiceContext;

#[derive(Debug, Parser)]
#[command(name = "visitsync", version, about = "Sync analytics sessions into user records")]
struct Cli {
    /// JSON file with a flat map of configuration keys. Its values take
    /// precedence over the environment.
    #[arg(long, global = true, env = "VISITSYNC_SECRETS_FILE")]
    secrets_file: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one full sync and print its report.
    Run,
    /// Sync on the configured interval until interrupted.
    Serve,
    /// Check connectivity to the store, the session source and the analytics API.
    Check,
    /// Print the persisted watermark document.
    Watermark,
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();
}

fn load_config(secrets_file: Option<&PathBuf>) -> anyhow::Result<SyncConfig> {
    let mut source = LayeredConfigSource::new();
    if let Some(path) = secrets_file {
        source = source.with_layer(JsonFileConfigSource::load(path)?);
    }
    let source = source.with_layer(EnvConfigSource);
    Ok(SyncConfig::from_source(&source as &dyn ConfigSource)?)
}

/// Flips the returned receiver to `true` on Ctrl-C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested; finishing current work");
                let _ = tx.send(true);
            }
            Err(err) => tracing::error!(error = %err, "failed to listen for Ctrl-C"),
        }
    });
    rx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(cli.secrets_file.as_ref()).context("loading configuration")?;
    let ctx = ServiceContext::build(config)?;

    match cli.command {
        Command::Run => {
            let report = commands::run_once(&ctx).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.failed_partitions() > 0 {
                tracing::warn!(
                    failed_websites = report.failed_partitions(),
                    "run completed with website failures"
                );
            }
        }
        Command::Serve => {
            commands::serve(&ctx, shutdown_signal()).await;
        }
        Command::Check => {
            let report = commands::check(&ctx).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.all_ok() {
                anyhow::bail!("one or more dependencies are unreachable");
            }
        }
        Command::Watermark => {
            println!("{}", commands::watermark_json(&ctx)?);
        }
    }
    Ok(())
}
