//! Launchpad service: the surface exposed to UI/admin collaborators.
//!
//! Owns one reconciler per tracked collection plus the shared store, chain
//! reader and eligibility service. Pricing and rarity queries are
//! synchronous over validated configs; eligibility is an on-demand chain
//! read; rescans delegate to the collection's reconciler.

use crate::engine::chain::ChainReader;
use crate::engine::eligibility::{EligibilityResult, EligibilityService};
use crate::engine::pricing;
use crate::engine::rarity::{self, RarityAssignment, TraitSelection};
use crate::engine::reconciler::MintReconciler;
use crate::engine::storage::MintStore;
use crate::engine::types::{
    CollectionConfig, CollectionStatus, MintRecord, PriceQuote, ScanSummary,
};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const ELIGIBILITY_CACHE_TTL: Duration = Duration::from_secs(30);
const SCAN_PAGE_SIZE: usize = 200;

struct CollectionEntry {
    config: RwLock<Arc<CollectionConfig>>,
    reconciler: Arc<MintReconciler>,
}

/// Top-level engine facade. Created once at service start; collections and
/// their reconcilers live for the process lifetime.
pub struct LaunchpadService {
    collections: HashMap<String, CollectionEntry>,
    store: Arc<dyn MintStore>,
    eligibility: EligibilityService,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LaunchpadService {
    /// Build the service from validated collection configs.
    pub fn new(
        configs: Vec<CollectionConfig>,
        chain: Arc<dyn ChainReader>,
        store: Arc<dyn MintStore>,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut collections = HashMap::new();
        for config in configs {
            config
                .validate()
                .with_context(|| format!("invalid config for collection {}", config.collection_id))?;
            let reconciler = Arc::new(MintReconciler::new(
                config.collection_id.clone(),
                config.scan_address.clone(),
                Arc::clone(&chain),
                Arc::clone(&store),
                SCAN_PAGE_SIZE,
            ));
            collections.insert(
                config.collection_id.clone(),
                CollectionEntry {
                    config: RwLock::new(Arc::new(config)),
                    reconciler,
                },
            );
        }

        Ok(Self {
            collections,
            store,
            eligibility: EligibilityService::new(chain, ELIGIBILITY_CACHE_TTL),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Spawn the periodic scan loop for every collection. Scans for
    /// different collections run concurrently; each collection's loop is
    /// single-flight by construction.
    pub fn spawn_reconcilers(&self, interval: Duration) -> Vec<JoinHandle<()>> {
        self.collections
            .values()
            .map(|entry| {
                let reconciler = Arc::clone(&entry.reconciler);
                let shutdown = self.shutdown_rx.clone();
                tokio::spawn(async move { reconciler.run(interval, shutdown).await })
            })
            .collect()
    }

    /// Signal all reconcilers to stop. In-flight batches abort without
    /// advancing their cursor, exactly like a failed batch.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(true).is_err() {
            warn!("shutdown signal had no listeners");
        }
    }

    fn entry(&self, collection_id: &str) -> Result<&CollectionEntry> {
        self.collections
            .get(collection_id)
            .with_context(|| format!("unknown collection {}", collection_id))
    }

    fn config(&self, collection_id: &str) -> Result<Arc<CollectionConfig>> {
        Ok(Arc::clone(&self.entry(collection_id)?.config.read().unwrap()))
    }

    /// Price of the next mint at the current supply position.
    pub async fn current_price(&self, collection_id: &str) -> Result<PriceQuote> {
        let config = self.config(collection_id)?;
        let minted = self.store.record_count(collection_id).await?;
        Ok(pricing::quote(minted, &config))
    }

    /// Price preview at a hypothetical future count.
    pub async fn price_at(&self, collection_id: &str, minted_count: u64) -> Result<u64> {
        let config = self.config(collection_id)?;
        Ok(pricing::price_at(minted_count, &config))
    }

    /// Token-gating eligibility for a wallet.
    pub async fn check_eligibility(
        &self,
        collection_id: &str,
        wallet: &str,
    ) -> Result<EligibilityResult> {
        let config = self.config(collection_id)?;
        self.eligibility.check(wallet, &config.gating).await
    }

    /// Rarity tier and token allocation for a mint ordinal.
    pub fn rarity_assignment(
        &self,
        collection_id: &str,
        ordinal: u64,
    ) -> Result<RarityAssignment> {
        let config = self.config(collection_id)?;
        rarity::assign(ordinal, &config)
    }

    /// Deterministic trait set for an ordinal. Fails before the reveal seed
    /// is fixed.
    pub fn reveal_traits(&self, collection_id: &str, ordinal: u64) -> Result<Vec<TraitSelection>> {
        let config = self.config(collection_id)?;
        if ordinal >= config.total_supply {
            bail!(
                "ordinal {} out of range for collection {}",
                ordinal,
                collection_id
            );
        }
        let seed = config
            .reveal_seed
            .as_deref()
            .with_context(|| format!("collection {} has no reveal seed yet", collection_id))?;
        Ok(rarity::sample_traits(seed, ordinal, &config.trait_categories))
    }

    /// Mint records in ordinal order, optionally from `since_ordinal` on.
    pub async fn mint_records(
        &self,
        collection_id: &str,
        since_ordinal: Option<u64>,
    ) -> Result<Vec<MintRecord>> {
        self.entry(collection_id)?;
        self.store.records_since(collection_id, since_ordinal).await
    }

    /// How many mints a wallet already holds, for per-wallet limit checks.
    pub async fn wallet_mint_count(&self, collection_id: &str, owner: &str) -> Result<u64> {
        self.entry(collection_id)?;
        self.store.owner_mint_count(collection_id, owner).await
    }

    /// Trigger a reconciliation pass outside the periodic schedule.
    /// `from_genesis` re-reads the full history (recovery mode).
    pub async fn force_rescan(
        &self,
        collection_id: &str,
        from_genesis: bool,
    ) -> Result<ScanSummary> {
        let entry = self.entry(collection_id)?;
        entry.reconciler.scan(from_genesis, &self.shutdown_rx).await
    }

    /// Record a mint transaction the platform itself just confirmed.
    pub async fn register_mint(
        &self,
        collection_id: &str,
        signature: &str,
    ) -> Result<Option<MintRecord>> {
        let entry = self.entry(collection_id)?;
        entry.reconciler.register_submission(signature).await
    }

    /// Supply progress snapshot.
    pub async fn collection_status(&self, collection_id: &str) -> Result<CollectionStatus> {
        let config = self.config(collection_id)?;
        let minted = self.store.record_count(collection_id).await?;
        let phase = config.phase_at(minted);
        Ok(CollectionStatus {
            collection_id: collection_id.to_string(),
            version: config.version,
            total_supply: config.total_supply,
            minted_count: minted,
            percent_minted: (minted as f64 / config.total_supply as f64) * 100.0,
            active_phase: phase.name.clone(),
            phase_remaining: phase.end.saturating_sub(minted.max(phase.start)),
            revealed: minted >= config.reveal_threshold,
        })
    }

    /// Replace a collection's config with a new, higher version. This is
    /// the only mutation path; the old version stays in effect until the
    /// replacement validates.
    pub fn update_collection(&self, new_config: CollectionConfig) -> Result<()> {
        new_config.validate().with_context(|| {
            format!("invalid config for collection {}", new_config.collection_id)
        })?;
        let entry = self.entry(&new_config.collection_id)?;
        let mut slot = entry.config.write().unwrap();
        if new_config.version <= slot.version {
            bail!(
                "config version {} does not supersede current version {}",
                new_config.version,
                slot.version
            );
        }
        info!(
            "collection {} config updated to version {}",
            new_config.collection_id, new_config.version
        );
        *slot = Arc::new(new_config);
        Ok(())
    }

    pub fn collection_ids(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }
}
