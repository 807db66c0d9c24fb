//! lokiwatchd — the lokiwatch daemon.
//!
//! Polls Loki for server lifecycle events, keeps per-server and
//! per-project health state, and pushes the derived gauges to a
//! Prometheus Pushgateway.
//!
//! # Usage
//!
//! ```text
//! lokiwatchd --config /etc/lokiwatch.toml run
//! lokiwatchd once
//! lokiwatchd check-config
//! ```

mod logging;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use lokiwatch_core::{ObservedAt, WatchConfig};
use lokiwatch_engine::HealthEngine;
use lokiwatch_loki::LokiClient;
use lokiwatch_metrics::PushGateway;
use lokiwatch_poller::PollDriver;

#[derive(Parser)]
#[command(name = "lokiwatchd", about = "Loki server health poller", version)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Poll until interrupted.
    Run,
    /// Run a single cycle and exit. Fails if the fetch fails.
    Once,
    /// Print the effective config as TOML and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = WatchConfig::load(cli.config.as_deref()).context("failed to load config")?;

    if cli.command == Command::CheckConfig {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let _guard = logging::init(&config.logging).context("failed to initialize logging")?;
    info!(config = ?cli.config, "lokiwatchd starting");

    let mut driver = PollDriver::new(
        LokiClient::new(&config.loki),
        PushGateway::new(&config.push),
        HealthEngine::new(config.timeouts.clone()),
        &config.poll,
    );

    match cli.command {
        Command::Once => {
            let report = driver.run_cycle(ObservedAt::now()).await?;
            info!(published = report.published, servers = driver.engine().server_count(), "single cycle done");
        }
        Command::Run => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("shutdown signal received");
                        let _ = shutdown_tx.send(true);
                    }
                    Err(e) => {
                        error!(error = %e, "failed to install ctrl-c handler");
                        // Keep the sender alive so the loop is not told to stop.
                        std::future::pending::<()>().await;
                        drop(shutdown_tx);
                    }
                }
            });

            driver.run(shutdown_rx).await?;
        }
        Command::CheckConfig => {}
    }

    info!("lokiwatchd stopped");
    Ok(())
}
