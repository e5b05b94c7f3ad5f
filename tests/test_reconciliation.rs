//! Reconciler behavior against a scripted chain: idempotence, dedup,
//! errored-transaction exclusion, cursor discipline and recovery rescans.

mod common;

use common::MockChain;
use launchpad_engine::engine::chain::ChainReader;
use launchpad_engine::engine::storage::{MemoryMintStore, MintStore};
use launchpad_engine::engine::types::DiscoverySource;
use launchpad_engine::engine::MintReconciler;
use std::sync::Arc;
use tokio::sync::watch;

const COLLECTION: &str = "exclusive";
const SCAN_ADDRESS: &str = "LaunchpadAuthority1111111111111111111111111";

fn reconciler(
    chain: &Arc<MockChain>,
    store: &Arc<MemoryMintStore>,
    page_size: usize,
) -> MintReconciler {
    MintReconciler::new(
        COLLECTION,
        SCAN_ADDRESS,
        Arc::clone(chain) as Arc<dyn ChainReader>,
        Arc::clone(store) as Arc<dyn MintStore>,
        page_size,
    )
}

fn no_cancel() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
async fn scan_records_valid_mints_in_chain_order() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryMintStore::new());
    chain.push_mint("Sig1", 101, "MintA", "WalletA");
    chain.push_mint("Sig2", 102, "MintB", "WalletB");
    chain.push_transfer("Sig3", 103, "WalletC");
    chain.push_errored_mint("Sig4", 104, "MintD", "WalletD");
    chain.push_mint("Sig5", 105, "MintE", "WalletA");

    let reconciler = reconciler(&chain, &store, 50);
    let summary = reconciler.scan(false, &no_cancel()).await.unwrap();

    assert_eq!(summary.scanned_signatures, 5);
    assert_eq!(summary.new_records, 3);
    assert_eq!(summary.errored_txs, 1);
    assert_eq!(summary.unrecognized_txs, 1);

    let records = store.records_since(COLLECTION, None).await.unwrap();
    assert_eq!(records.len(), 3);
    // Ordinals follow chain order, oldest first.
    assert_eq!(records[0].mint, "MintA");
    assert_eq!(records[0].ordinal, 0);
    assert_eq!(records[1].mint, "MintB");
    assert_eq!(records[1].ordinal, 1);
    assert_eq!(records[2].mint, "MintE");
    assert_eq!(records[2].ordinal, 2);
    assert!(records
        .iter()
        .all(|r| r.discovered_via == DiscoverySource::Scan));
}

#[tokio::test]
async fn rescan_of_same_range_is_idempotent() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryMintStore::new());
    for i in 1..=4u64 {
        chain.push_mint(&format!("Sig{}", i), 100 + i, &format!("Mint{}", i), "Wallet");
    }

    let reconciler = reconciler(&chain, &store, 50);
    let first = reconciler.scan(false, &no_cancel()).await.unwrap();
    assert_eq!(first.new_records, 4);
    let before: Vec<_> = store.records_since(COLLECTION, None).await.unwrap();

    // Incremental: the cursor bounds the listing, nothing new to see.
    let second = reconciler.scan(false, &no_cancel()).await.unwrap();
    assert_eq!(second.new_records, 0);
    assert_eq!(second.scanned_signatures, 0);

    // Full genesis rescan re-reads everything and still changes nothing.
    let recovery = reconciler.scan(true, &no_cancel()).await.unwrap();
    assert_eq!(recovery.scanned_signatures, 4);
    assert_eq!(recovery.new_records, 0);

    let after: Vec<_> = store.records_since(COLLECTION, None).await.unwrap();
    assert_eq!(before, after, "ordinals must not shift across rescans");
}

#[tokio::test]
async fn repeated_listing_entries_are_deduplicated() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryMintStore::new());
    chain.push_mint("Sig1", 101, "MintA", "WalletA");
    chain.repeat_listing("Sig1");

    let reconciler = reconciler(&chain, &store, 50);
    let summary = reconciler.scan(false, &no_cancel()).await.unwrap();

    assert_eq!(summary.scanned_signatures, 2);
    assert_eq!(summary.new_records, 1);
    assert_eq!(store.record_count(COLLECTION).await.unwrap(), 1);
}

#[tokio::test]
async fn errored_transactions_never_become_records() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryMintStore::new());
    // Errored both at the listing level and at the parsed-meta level; the
    // account layout matches the mint heuristic in both cases.
    chain.push_errored_mint("SigBad", 101, "MintX", "WalletX");

    let reconciler = reconciler(&chain, &store, 50);
    let summary = reconciler.scan(false, &no_cancel()).await.unwrap();

    assert_eq!(summary.new_records, 0);
    assert_eq!(summary.errored_txs, 1);
    assert_eq!(store.record_count(COLLECTION).await.unwrap(), 0);
}

#[tokio::test]
async fn partial_batch_failure_leaves_cursor_for_retry() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryMintStore::new());
    chain.push_mint("Sig1", 101, "MintA", "WalletA");
    chain.push_mint("Sig2", 102, "MintB", "WalletB");
    chain.push_mint("Sig3", 103, "MintC", "WalletC");
    chain.fail_fetch("Sig2");

    let reconciler = reconciler(&chain, &store, 50);
    let result = reconciler.scan(false, &no_cancel()).await;
    assert!(result.is_err(), "batch with a failed fetch must not succeed");
    assert!(store.load_cursor(COLLECTION).await.unwrap().is_none());
    // The oldest transaction was already committed before the failure.
    assert_eq!(store.record_count(COLLECTION).await.unwrap(), 1);

    // Next cycle retries the same range and completes it.
    chain.clear_fetch_failures();
    let summary = reconciler.scan(false, &no_cancel()).await.unwrap();
    assert_eq!(summary.new_records, 2);

    let records = store.records_since(COLLECTION, None).await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].mint, "MintA");
    assert_eq!(records[1].mint, "MintB");
    assert_eq!(records[2].mint, "MintC");
    let cursor = store.load_cursor(COLLECTION).await.unwrap().unwrap();
    assert_eq!(cursor.last_signature, "Sig3");
    assert_eq!(cursor.last_slot, 103);
}

#[tokio::test]
async fn cancellation_behaves_like_a_failed_batch() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryMintStore::new());
    chain.push_mint("Sig1", 101, "MintA", "WalletA");

    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let reconciler = reconciler(&chain, &store, 50);
    let result = reconciler.scan(false, &cancel_rx).await;
    assert!(result.is_err());
    assert!(store.load_cursor(COLLECTION).await.unwrap().is_none());
    assert_eq!(store.record_count(COLLECTION).await.unwrap(), 0);

    // A later, uncancelled cycle picks the work back up.
    let summary = reconciler.scan(false, &no_cancel()).await.unwrap();
    assert_eq!(summary.new_records, 1);
}

#[tokio::test]
async fn incremental_then_genesis_rescan_converge() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryMintStore::new());
    chain.push_mint("Sig1", 101, "MintA", "WalletA");
    chain.push_mint("Sig2", 102, "MintB", "WalletB");

    let reconciler = reconciler(&chain, &store, 50);
    assert_eq!(
        reconciler.scan(false, &no_cancel()).await.unwrap().new_records,
        2
    );

    // New chain activity after the first pass.
    chain.push_mint("Sig3", 103, "MintC", "WalletC");
    chain.push_mint("Sig4", 104, "MintD", "WalletA");
    let incremental = reconciler.scan(false, &no_cancel()).await.unwrap();
    assert_eq!(incremental.scanned_signatures, 2);
    assert_eq!(incremental.new_records, 2);

    let incremental_records = store.records_since(COLLECTION, None).await.unwrap();
    let recovery = reconciler.scan(true, &no_cancel()).await.unwrap();
    assert_eq!(recovery.scanned_signatures, 4);
    assert_eq!(recovery.new_records, 0);
    assert_eq!(
        store.records_since(COLLECTION, None).await.unwrap(),
        incremental_records
    );
}

#[tokio::test]
async fn pagination_walks_back_to_the_cursor() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryMintStore::new());
    for i in 1..=7u64 {
        chain.push_mint(&format!("Sig{}", i), 100 + i, &format!("Mint{}", i), "Wallet");
    }

    // Page size smaller than the backlog forces multiple listing calls.
    let reconciler = reconciler(&chain, &store, 3);
    let summary = reconciler.scan(false, &no_cancel()).await.unwrap();
    assert_eq!(summary.scanned_signatures, 7);
    assert_eq!(summary.new_records, 7);

    let records = store.records_since(COLLECTION, None).await.unwrap();
    assert_eq!(records[0].mint, "Mint1");
    assert_eq!(records[6].mint, "Mint7");
}

#[tokio::test]
async fn direct_submission_shares_dedup_and_ordinals_with_scans() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryMintStore::new());
    chain.push_mint("Sig1", 101, "MintA", "WalletA");

    let reconciler = reconciler(&chain, &store, 50);
    let record = reconciler
        .register_submission("Sig1")
        .await
        .unwrap()
        .expect("first submission should record");
    assert_eq!(record.ordinal, 0);
    assert_eq!(record.discovered_via, DiscoverySource::Submission);

    // Submitting again is a no-op.
    assert!(reconciler.register_submission("Sig1").await.unwrap().is_none());
    // The scan sees the signature as already known.
    let summary = reconciler.scan(false, &no_cancel()).await.unwrap();
    assert_eq!(summary.new_records, 0);
    assert_eq!(store.record_count(COLLECTION).await.unwrap(), 1);
    assert!(reconciler.is_signature_known("Sig1").await);
}

#[tokio::test]
async fn errored_submission_is_rejected() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryMintStore::new());
    chain.push_errored_mint("SigBad", 101, "MintX", "WalletX");

    let reconciler = reconciler(&chain, &store, 50);
    assert!(reconciler.register_submission("SigBad").await.is_err());
    assert_eq!(store.record_count(COLLECTION).await.unwrap(), 0);
}
