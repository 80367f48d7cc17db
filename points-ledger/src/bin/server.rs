//! Points ledger server binary

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

    tracing::info!("Starting GreenLoop points ledger");

    // Load configuration
    let config = Config::from_env()?;

    // Open ledger
    let ledger = Ledger::open(config).await?;
    tracing::info!("Ledger opened successfully");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down points ledger");
    ledger.shutdown().await?;
    Ok(())
}
