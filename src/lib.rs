//! launchpad-engine - Mint economics and reconciliation engine for an NFT
//! launch platform.
//!
//! This crate computes bonding-curve mint prices, assigns rarity tiers and
//! token allocations, evaluates token-gated discount eligibility, and
//! rebuilds the authoritative mint ledger by scanning chain history.

pub mod engine;
pub mod types;

// Re-export main types for convenience
pub use engine::{CollectionConfig, LaunchpadService, MintRecord};
