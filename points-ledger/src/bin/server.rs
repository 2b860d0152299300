//! Points ledger server binary
//!
//! Hosts the ledger core; the HTTP gateway in front of it is deployed
//! separately and consumes the crate API.

use anyhow::Context;
use points_ledger::{Config, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting points ledger server");

    // Load configuration: file path argument wins, then environment
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::from_env().context("loading config from environment")?,
    };

    let metrics_addr = config.metrics_listen_addr.clone();
    let ledger = Ledger::open(config).context("opening ledger")?;

    let stats = ledger.stats().context("reading store stats")?;
    tracing::info!(
        users = stats.total_users,
        streams = stats.total_streams,
        donations = stats.total_donations,
        transactions = stats.total_transactions,
        metrics_addr = %metrics_addr,
        "Ledger opened"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down points ledger server");
    Ok(())
}
