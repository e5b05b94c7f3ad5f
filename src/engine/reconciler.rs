//! Mint ledger reconciler.
//!
//! Derives the authoritative mint ledger from chain history: lists recent
//! signatures for the collection's scan address, classifies each new
//! transaction, and appends records with stable sequential ordinals. The
//! ledger is append-only; errored transactions never become records and a
//! re-scan of the same range produces nothing new.

use crate::engine::chain::{ChainReader, SignatureInfo};
use crate::engine::decoder::{self, TxOutcome};
use crate::engine::storage::{new_mint_record, MintStore};
use crate::engine::types::{DiscoverySource, MintRecord, ScanCursor, ScanSummary};
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

/// Scan cycle state, visible for metrics/debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    /// Listing signatures.
    Scanning,
    /// Classifying transactions and appending records.
    Reconciling,
    /// A cycle failed; transient, returns to `Idle` after logging.
    Failed,
}

struct ScanGuard {
    /// Signatures that already have records. The one piece of shared
    /// mutable state; also answered to outside callers via
    /// `is_signature_known`.
    known: HashSet<String>,
    /// Dedup set warmed from the store on first use.
    loaded: bool,
}

/// Per-collection reconciler. One instance per tracked collection; the
/// internal lock guarantees a single scan in flight, so ordinals can never
/// be double-assigned.
pub struct MintReconciler {
    collection_id: String,
    scan_address: String,
    chain: Arc<dyn ChainReader>,
    store: Arc<dyn MintStore>,
    page_size: usize,
    guard: Mutex<ScanGuard>,
    state: std::sync::Mutex<ScanState>,
}

impl MintReconciler {
    pub fn new(
        collection_id: impl Into<String>,
        scan_address: impl Into<String>,
        chain: Arc<dyn ChainReader>,
        store: Arc<dyn MintStore>,
        page_size: usize,
    ) -> Self {
        Self {
            collection_id: collection_id.into(),
            scan_address: scan_address.into(),
            chain,
            store,
            page_size: page_size.max(1),
            guard: Mutex::new(ScanGuard {
                known: HashSet::new(),
                loaded: false,
            }),
            state: std::sync::Mutex::new(ScanState::Idle),
        }
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: ScanState) {
        *self.state.lock().unwrap() = state;
    }

    /// Whether a signature already produced a record.
    pub async fn is_signature_known(&self, signature: &str) -> bool {
        let guard = self.guard.lock().await;
        if guard.loaded {
            return guard.known.contains(signature);
        }
        drop(guard);
        self.store
            .contains_signature(&self.collection_id, signature)
            .await
            .unwrap_or(false)
    }

    /// Periodic scan loop. Each collection runs its own loop; loops for
    /// different collections are independent.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: watch::Receiver<bool>) {
        info!(
            "reconciler for collection {} running every {:?}",
            self.collection_id, interval
        );
        let mut ticker = tokio::time::interval(interval);
        let mut shutdown_rx = shutdown.clone();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.scan(false, &shutdown).await {
                        Ok(summary) if summary.new_records > 0 => {
                            info!(
                                "collection {}: {} new mint records ({} signatures scanned)",
                                self.collection_id, summary.new_records, summary.scanned_signatures
                            );
                        }
                        Ok(_) => {}
                        Err(err) => {
                            // Operational failure; the ledger is simply a
                            // little behind until the next cycle.
                            error!("scan failed for collection {}: {:#}", self.collection_id, err);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("reconciler for collection {} shutting down", self.collection_id);
                    break;
                }
            }
        }
    }

    /// Run one reconciliation pass. `from_genesis` ignores the stored
    /// cursor and re-reads the full signature history (recovery mode);
    /// dedup makes it converge to the same record set as incremental scans.
    #[instrument(skip(self, cancel), fields(collection = %self.collection_id, from_genesis))]
    pub async fn scan(
        &self,
        from_genesis: bool,
        cancel: &watch::Receiver<bool>,
    ) -> Result<ScanSummary> {
        let mut guard = self.guard.lock().await;
        let started = Instant::now();
        self.set_state(ScanState::Scanning);

        let result = self
            .scan_locked(&mut guard, from_genesis, cancel, started)
            .await;
        match &result {
            Ok(_) => self.set_state(ScanState::Idle),
            Err(err) => {
                warn!(
                    "scan cycle for {} did not complete: {:#}; cursor not advanced",
                    self.collection_id, err
                );
                self.set_state(ScanState::Failed);
                self.set_state(ScanState::Idle);
            }
        }
        result
    }

    async fn scan_locked(
        &self,
        guard: &mut ScanGuard,
        from_genesis: bool,
        cancel: &watch::Receiver<bool>,
        started: Instant,
    ) -> Result<ScanSummary> {
        self.ensure_dedup_loaded(guard).await?;

        let cursor = if from_genesis {
            None
        } else {
            self.store.load_cursor(&self.collection_id).await?
        };

        let batch = self.collect_signatures(cursor.as_ref(), cancel).await?;
        let newest = batch.first().cloned();
        let mut summary = ScanSummary {
            collection_id: self.collection_id.clone(),
            from_genesis,
            scanned_signatures: batch.len() as u64,
            ..ScanSummary::default()
        };

        self.set_state(ScanState::Reconciling);

        // Oldest first, so ordinals follow chain order.
        for entry in batch.into_iter().rev() {
            if *cancel.borrow() {
                bail!("scan cancelled mid-batch");
            }
            if entry.err {
                debug!("skipping chain-errored transaction {}", entry.signature);
                summary.errored_txs += 1;
                continue;
            }
            match self
                .process_signature(guard, &entry, DiscoverySource::Scan)
                .await?
            {
                Processed::Recorded(_) => summary.new_records += 1,
                Processed::ChainError => summary.errored_txs += 1,
                Processed::Unrecognized => summary.unrecognized_txs += 1,
                Processed::Duplicate | Processed::Unavailable => {}
            }
        }

        // The cursor only advances after the whole batch committed; any
        // failure above leaves it where it was so the range is retried.
        if let Some(newest) = newest {
            self.store
                .save_cursor(&ScanCursor {
                    collection_id: self.collection_id.clone(),
                    last_signature: newest.signature,
                    last_slot: newest.slot,
                    updated_at: chrono::Utc::now().timestamp_millis() as u64,
                })
                .await?;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }

    async fn ensure_dedup_loaded(&self, guard: &mut ScanGuard) -> Result<()> {
        if guard.loaded {
            return Ok(());
        }
        let signatures = self
            .store
            .known_signatures(&self.collection_id)
            .await
            .context("failed to warm dedup set")?;
        debug!(
            "loaded {} known signatures for collection {}",
            signatures.len(),
            self.collection_id
        );
        guard.known = signatures.into_iter().collect();
        guard.loaded = true;
        Ok(())
    }

    /// Page backwards through the signature listing until the cursor (or
    /// genesis) is reached. Returns entries newest-first, bounded below by
    /// the cursor.
    async fn collect_signatures(
        &self,
        cursor: Option<&ScanCursor>,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Vec<SignatureInfo>> {
        let mut collected = Vec::new();
        let mut before: Option<String> = None;

        loop {
            if *cancel.borrow() {
                bail!("scan cancelled while listing signatures");
            }
            let page = self
                .chain
                .signatures_for_address(&self.scan_address, self.page_size, before.as_deref())
                .await?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            let mut reached_cursor = false;
            for entry in page {
                if let Some(cursor) = cursor {
                    if entry.signature == cursor.last_signature || entry.slot < cursor.last_slot {
                        reached_cursor = true;
                        break;
                    }
                }
                before = Some(entry.signature.clone());
                collected.push(entry);
            }
            if reached_cursor || page_len < self.page_size {
                break;
            }
        }

        Ok(collected)
    }

    async fn process_signature(
        &self,
        guard: &mut ScanGuard,
        entry: &SignatureInfo,
        discovered_via: DiscoverySource,
    ) -> Result<Processed> {
        if guard.known.contains(&entry.signature) {
            return Ok(Processed::Duplicate);
        }
        let tx = match self.chain.transaction(&entry.signature).await? {
            Some(tx) => tx,
            None => {
                warn!(
                    "signature {} listed but transaction unavailable; skipping",
                    entry.signature
                );
                return Ok(Processed::Unavailable);
            }
        };

        match decoder::classify(&tx) {
            TxOutcome::ChainError => {
                debug!("transaction {} errored on-chain", entry.signature);
                Ok(Processed::ChainError)
            }
            TxOutcome::Unrecognized => {
                warn!(
                    "transaction {} does not match the mint pattern; skipping",
                    entry.signature
                );
                Ok(Processed::Unrecognized)
            }
            TxOutcome::Recognized(event) => {
                // Ordinal = number of records already known. Stable across
                // re-scans because duplicates never reach this point.
                let ordinal = self.store.record_count(&self.collection_id).await?;
                let record = new_mint_record(
                    &self.collection_id,
                    &event.mint,
                    &event.owner,
                    &entry.signature,
                    entry.slot,
                    entry.block_time,
                    ordinal,
                    discovered_via,
                );
                self.store.insert_record(&record).await?;
                guard.known.insert(entry.signature.clone());
                info!(
                    "recorded mint {} (ordinal {}) for collection {}",
                    record.mint, record.ordinal, self.collection_id
                );
                Ok(Processed::Recorded(record))
            }
        }
    }

    /// Register a mint the platform itself just landed, without waiting for
    /// the next scan cycle. Same dedup and ordinal rules as the scan path.
    pub async fn register_submission(&self, signature: &str) -> Result<Option<MintRecord>> {
        let mut guard = self.guard.lock().await;
        self.ensure_dedup_loaded(&mut guard).await?;
        if guard.known.contains(signature) {
            return Ok(None);
        }

        let tx = self
            .chain
            .transaction(signature)
            .await?
            .with_context(|| format!("transaction {} not found on chain", signature))?;
        let entry = SignatureInfo {
            signature: signature.to_string(),
            slot: tx.slot,
            block_time: tx.block_time,
            err: tx.failed,
        };
        if entry.err {
            bail!("transaction {} errored on-chain; not recorded", signature);
        }
        match self
            .process_signature(&mut guard, &entry, DiscoverySource::Submission)
            .await?
        {
            Processed::Recorded(record) => Ok(Some(record)),
            Processed::Duplicate => Ok(None),
            Processed::ChainError => {
                bail!("transaction {} errored on-chain; not recorded", signature)
            }
            Processed::Unrecognized => {
                bail!("transaction {} does not contain a mint", signature)
            }
            Processed::Unavailable => {
                bail!("transaction {} unavailable on chain", signature)
            }
        }
    }
}

enum Processed {
    Recorded(MintRecord),
    Duplicate,
    ChainError,
    Unrecognized,
    Unavailable,
}
