//! Mint economics and reconciliation engine.
//!
//! Dependency order, leaves first: `chain` (I/O boundary), `pricing` and
//! `rarity` (pure), `eligibility`, then `reconciler` which ties them to the
//! `storage` ledger, fronted by `service`.

pub mod chain;
pub mod decoder;
pub mod eligibility;
pub mod pricing;
pub mod rarity;
pub mod reconciler;
pub mod service;
pub mod storage;
pub mod types;

// Re-export main types
pub use chain::{ChainReader, RawTokenBalance, SignatureInfo, SolanaChainReader, TransactionView};
pub use decoder::{MintEvent, TxOutcome};
pub use eligibility::{EligibilityResult, EligibilityService, EligibilityTier};
pub use rarity::{RarityAssignment, TraitSelection};
pub use reconciler::{MintReconciler, ScanState};
pub use service::LaunchpadService;
pub use storage::{MemoryMintStore, MintStore, SqliteMintStore};
pub use types::{
    CollectionConfig, CollectionStatus, DiscoverySource, GatingConfig, MintRecord, Phase,
    PhasePricing, PriceQuote, RarityTier, ScanCursor, ScanSummary, TraitCategory, WeightedTrait,
};
