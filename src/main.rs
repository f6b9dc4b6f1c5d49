use anyhow::Context;
use deadman::{
    api::Server,
    config::Config,
    l1::{EthersGateway, TimedGateway},
    watchdog::{HealthHandle, Watchdog},
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// The main entry point for the watchdog.
///
/// Loads the configuration, connects to the chain, seeds the watchdog from
/// the module contract and runs it alongside the health API until Ctrl-C,
/// a fatal error, or (when configured) a confirmed fallback transfer.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());
    let config = Config::load(&path)?;
    info!("Watchdog starting with config: {:?}", config);

    let gateway = EthersGateway::connect(&config.l1).context("failed to set up ledger gateway")?;
    let gateway = TimedGateway::from_config(gateway, &config.watchdog);

    let health = HealthHandle::new();

    // Health API runs in the background for the lifetime of the process
    let server = Server::new(config.api.clone(), health.clone());
    tokio::spawn(async move {
        if let Err(e) = server.start().await {
            error!("Health API error: {:?}", e);
        }
    });

    let (stop_tx, mut stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping watchdog");
            let _ = stop_tx.send(true);
        }
    });

    let Some(watchdog) = Watchdog::seed(
        gateway,
        config.watchdog.clone(),
        config.l1.start_block,
        health,
        &mut stop_rx,
    )
    .await
    else {
        info!("Stopped before the watchdog was seeded");
        return Ok(());
    };

    watchdog.run(stop_rx).await?;
    info!("Watchdog finished");
    Ok(())
}
