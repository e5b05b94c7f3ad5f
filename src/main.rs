//! Main entry point for the launchpad engine service.
//!
//! Loads collection configs, wires the chain reader and SQLite ledger into
//! the service, spawns one reconciler per collection, and runs until
//! interrupted.

use anyhow::{Context, Result};
use launchpad_engine::engine::{LaunchpadService, SolanaChainReader, SqliteMintStore};
use launchpad_engine::CollectionConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber;

const DEFAULT_CONFIG_PATH: &str = "collections.json";
const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
const SCAN_INTERVAL: Duration = Duration::from_secs(30);
const RPC_TIMEOUT: Duration = Duration::from_secs(30);
const RPC_REQUESTS_PER_SECOND: u32 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let rpc_url = std::env::var("RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());

    info!("Starting launchpad engine");
    info!("Config: {}, RPC: {}", config_path, rpc_url);

    let configs = CollectionConfig::load_all(&config_path)
        .with_context(|| format!("failed to load collections from {}", config_path))?;
    info!("Loaded {} collection config(s)", configs.len());

    let chain = Arc::new(SolanaChainReader::new(
        rpc_url,
        RPC_TIMEOUT,
        RPC_REQUESTS_PER_SECOND,
    ));
    let store = Arc::new(SqliteMintStore::new().await?);

    let service = LaunchpadService::new(configs, chain, store)?;

    for collection_id in service.collection_ids() {
        let status = service.collection_status(&collection_id).await?;
        info!(
            "collection {}: {}/{} minted, phase '{}'",
            collection_id, status.minted_count, status.total_supply, status.active_phase
        );
    }

    let handles = service.spawn_reconcilers(SCAN_INTERVAL);
    info!("Spawned {} reconciler(s)", handles.len());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received; stopping reconcilers");
    service.shutdown();

    for handle in handles {
        let _ = handle.await;
    }
    info!("Launchpad engine stopped");

    Ok(())
}
