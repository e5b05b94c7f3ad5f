//! Rarity tier assignment and deterministic trait sampling.
//!
//! Tier assignment is a pure lookup over contiguous ordinal ranges so that
//! the Nth mint is always the same rarity and anyone can replay it against
//! chain order. Trait sampling derives a per-mint RNG from
//! `sha256(seed || ordinal)`; the same (seed, ordinal) yields the same trait
//! set forever.

use crate::engine::types::{CollectionConfig, TraitCategory};
use anyhow::{bail, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Derived rarity for one ordinal. Recomputable at any time; never stored
/// as an authority of its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RarityAssignment {
    pub ordinal: u64,
    pub tier: String,
    pub token_allocation: u64,
    pub vesting_days: u32,
    pub cliff_days: u32,
}

/// One sampled trait value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraitSelection {
    pub category: String,
    pub value: String,
}

/// Assign the rarity tier and token allocation for a mint ordinal.
///
/// An ordinal outside `[0, total_supply)` is a programming or configuration
/// error and fails hard; it is never clamped.
pub fn assign(ordinal: u64, config: &CollectionConfig) -> Result<RarityAssignment> {
    if ordinal >= config.total_supply {
        bail!(
            "ordinal {} out of range for collection {} (total supply {})",
            ordinal,
            config.collection_id,
            config.total_supply
        );
    }
    for tier in &config.rarity_tiers {
        if ordinal >= tier.start && ordinal < tier.end {
            return Ok(RarityAssignment {
                ordinal,
                tier: tier.name.clone(),
                token_allocation: tier.token_allocation,
                vesting_days: config.allocation_vesting_days,
                cliff_days: config.allocation_cliff_days,
            });
        }
    }
    // Unreachable on a validated config; tiers cover [0, total_supply).
    bail!(
        "ordinal {} not covered by any rarity tier of collection {}",
        ordinal,
        config.collection_id
    )
}

/// Sample one trait per category for a mint, deterministically.
///
/// The RNG seed is `sha256("{seed}-{ordinal}")`, matching what third
/// parties will recompute when auditing a reveal.
pub fn sample_traits(
    seed: &str,
    ordinal: u64,
    categories: &[TraitCategory],
) -> Vec<TraitSelection> {
    let mut rng = rng_for(seed, ordinal);
    categories
        .iter()
        .map(|category| TraitSelection {
            category: category.name.clone(),
            value: weighted_pick(&mut rng, category).to_string(),
        })
        .collect()
}

fn rng_for(seed: &str, ordinal: u64) -> ChaCha8Rng {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b"-");
    hasher.update(ordinal.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    ChaCha8Rng::from_seed(bytes)
}

/// Weighted sample: draw a uniform value below the total weight and take
/// the first option whose cumulative weight exceeds it.
fn weighted_pick<'a>(rng: &mut ChaCha8Rng, category: &'a TraitCategory) -> &'a str {
    let total: u64 = category.options.iter().map(|t| t.weight as u64).sum();
    let mut draw = rng.gen_range(0..total);
    for option in &category.options {
        let weight = option.weight as u64;
        if draw < weight {
            return &option.name;
        }
        draw -= weight;
    }
    // Total weight is validated positive, so the loop always returns.
    &category.options[category.options.len() - 1].name
}
