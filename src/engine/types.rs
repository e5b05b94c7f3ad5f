//! Core types for the mint economics and reconciliation engine.
//!
//! `CollectionConfig` is the single configuration surface: phase pricing,
//! rarity tiers, the gating token, and scan parameters all live here and are
//! loaded at service start, never hard-coded.

use crate::types::{Pubkey, Signature};
use anyhow::{bail, Context, Result};
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pricing rule for a single phase of the mint.
///
/// All prices are fixed-point integers in the smallest unit of the
/// collection's currency (lamport-equivalent). Conversion to a
/// human-readable decimal happens at the presentation boundary, never here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhasePricing {
    /// Every mint in the phase costs the same. A zero price is a valid,
    /// first-class "free" phase.
    Flat { price: u64 },
    /// Price interpolates from `price_start` to `price_end` across the
    /// phase's ordinal range, shaped by `exponent` (1 = linear, 2 = convex).
    Curve {
        price_start: u64,
        price_end: u64,
        exponent: u32,
    },
}

/// One contiguous slice of the supply with its own pricing rule.
/// Covers ordinals in `[start, end)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Phase {
    pub name: String,
    pub start: u64,
    pub end: u64,
    pub pricing: PhasePricing,
}

impl Phase {
    /// Price charged for the first mint of the phase.
    pub fn entry_price(&self) -> u64 {
        match self.pricing {
            PhasePricing::Flat { price } => price,
            PhasePricing::Curve { price_start, .. } => price_start,
        }
    }

    /// Price the phase tops out at.
    pub fn exit_price(&self) -> u64 {
        match self.pricing {
            PhasePricing::Flat { price } => price,
            PhasePricing::Curve { price_end, .. } => price_end,
        }
    }
}

/// A rarity tier over a contiguous ordinal range `[start, end)`.
///
/// Tiers are positional by design: the Nth mint is always the same rarity,
/// so third parties can audit assignments against chain order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RarityTier {
    pub name: String,
    pub start: u64,
    pub end: u64,
    /// Flat token allocation granted to holders of this tier.
    pub token_allocation: u64,
}

/// A single weighted trait option within a category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeightedTrait {
    pub name: String,
    pub weight: u32,
}

/// A trait category with its rarity-weighted option list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraitCategory {
    pub name: String,
    pub options: Vec<WeightedTrait>,
}

/// Gating token identity and discount floors.
///
/// Floors are denominated in whole tokens; the eligibility service converts
/// the raw on-chain amount using `decimals` before comparing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatingConfig {
    pub token_mint: Pubkey,
    pub decimals: u8,
    /// Holding at least this many whole tokens grants a 100% discount.
    pub full_discount_floor: u64,
    /// Holding at least this many whole tokens (but below the full floor)
    /// grants `partial_discount_bps`.
    pub partial_discount_floor: u64,
    pub partial_discount_bps: u16,
}

/// Immutable-once-deployed collection configuration.
///
/// Authorized updates replace the whole config with a bumped `version`;
/// nothing mutates in place mid-mint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub collection_id: String,
    pub version: u32,
    /// On-chain address whose transaction history is scanned for mints
    /// (the collection's mint authority / program address).
    pub scan_address: Pubkey,
    /// Display currency of all phase prices, e.g. "LOS".
    pub currency: String,
    /// Number of decimal places of the pricing currency.
    pub currency_decimals: u8,
    pub total_supply: u64,
    pub phases: NonEmpty<Phase>,
    pub rarity_tiers: Vec<RarityTier>,
    /// Trait categories for the hash-seeded reveal sampler. May be empty
    /// for collections without randomized traits.
    #[serde(default)]
    pub trait_categories: Vec<TraitCategory>,
    /// Global seed fixed at reveal time. `None` until reveal.
    #[serde(default)]
    pub reveal_seed: Option<String>,
    /// Minted count at which the collection is considered revealed.
    pub reveal_threshold: u64,
    pub gating: GatingConfig,
    pub max_mints_per_wallet: u32,
    /// Vesting metadata surfaced with rarity assignments.
    #[serde(default)]
    pub allocation_vesting_days: u32,
    #[serde(default)]
    pub allocation_cliff_days: u32,
}

impl CollectionConfig {
    /// Load and validate a list of collection configs from a JSON file.
    pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<CollectionConfig>> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file {:?}", path.as_ref()))?;
        let configs: Vec<CollectionConfig> =
            serde_json::from_str(&raw).context("failed to parse collection config JSON")?;
        for config in &configs {
            config
                .validate()
                .with_context(|| format!("invalid config for collection {}", config.collection_id))?;
        }
        Ok(configs)
    }

    /// Validate every configuration invariant. Called at load time; the
    /// pure pricing/rarity functions assume a validated config.
    pub fn validate(&self) -> Result<()> {
        if self.total_supply == 0 {
            bail!("total_supply must be positive");
        }
        self.validate_phases()?;
        self.validate_rarity_tiers()?;
        self.validate_traits()?;
        if self.gating.partial_discount_floor > self.gating.full_discount_floor {
            bail!(
                "partial discount floor {} exceeds full discount floor {}",
                self.gating.partial_discount_floor,
                self.gating.full_discount_floor
            );
        }
        if self.gating.partial_discount_bps > 10_000 {
            bail!("partial_discount_bps must be at most 10000");
        }
        Ok(())
    }

    /// Phases must partition an ordinal prefix with non-decreasing prices
    /// within and across boundaries.
    fn validate_phases(&self) -> Result<()> {
        let mut previous: Option<&Phase> = None;
        for phase in self.phases.iter() {
            if phase.end <= phase.start {
                bail!("phase '{}' has empty or inverted range", phase.name);
            }
            if let PhasePricing::Curve {
                price_start,
                price_end,
                exponent,
            } = phase.pricing
            {
                if price_end < price_start {
                    bail!("phase '{}' has decreasing curve prices", phase.name);
                }
                if !(1..=4).contains(&exponent) {
                    bail!("phase '{}' has unsupported curve exponent {}", phase.name, exponent);
                }
            }
            if let Some(prev) = previous {
                if phase.start != prev.end {
                    bail!(
                        "phase '{}' does not start where '{}' ends ({} != {})",
                        phase.name,
                        prev.name,
                        phase.start,
                        prev.end
                    );
                }
                if phase.entry_price() < prev.exit_price() {
                    bail!(
                        "price drops from {} to {} across phase boundary '{}' -> '{}'",
                        prev.exit_price(),
                        phase.entry_price(),
                        prev.name,
                        phase.name
                    );
                }
            }
            previous = Some(phase);
        }
        if self.phases.last().end > self.total_supply {
            bail!(
                "final phase ends at {} beyond total supply {}",
                self.phases.last().end,
                self.total_supply
            );
        }
        Ok(())
    }

    /// Rarity tiers must exactly cover `[0, total_supply)`.
    fn validate_rarity_tiers(&self) -> Result<()> {
        if self.rarity_tiers.is_empty() {
            bail!("at least one rarity tier is required");
        }
        let mut expected_start = 0u64;
        for tier in &self.rarity_tiers {
            if tier.start != expected_start {
                bail!(
                    "rarity tier '{}' starts at {}, expected {} (gap or overlap)",
                    tier.name,
                    tier.start,
                    expected_start
                );
            }
            if tier.end <= tier.start {
                bail!("rarity tier '{}' has empty or inverted range", tier.name);
            }
            expected_start = tier.end;
        }
        if expected_start != self.total_supply {
            bail!(
                "rarity tiers cover [0, {}) but total supply is {}",
                expected_start,
                self.total_supply
            );
        }
        Ok(())
    }

    fn validate_traits(&self) -> Result<()> {
        for category in &self.trait_categories {
            if category.options.is_empty() {
                bail!("trait category '{}' has no options", category.name);
            }
            let total: u64 = category.options.iter().map(|t| t.weight as u64).sum();
            if total == 0 {
                bail!("trait category '{}' has zero total weight", category.name);
            }
        }
        Ok(())
    }

    /// The phase an ordinal falls into. Counts below the first phase map to
    /// the first phase, counts at or past the final end map to the last.
    pub fn phase_at(&self, minted_count: u64) -> &Phase {
        for phase in self.phases.iter() {
            if minted_count < phase.end {
                return phase;
            }
        }
        self.phases.last()
    }
}

/// How a mint record entered the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    /// Found by the background signature scan.
    Scan,
    /// Registered directly after the platform itself landed the transaction.
    Submission,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySource::Scan => "scan",
            DiscoverySource::Submission => "submission",
        }
    }
}

impl std::str::FromStr for DiscoverySource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scan" => Ok(DiscoverySource::Scan),
            "submission" => Ok(DiscoverySource::Submission),
            other => bail!("unknown discovery source '{}'", other),
        }
    }
}

/// One confirmed mint. Created exactly once when its signature is first
/// observed; immutable and never deleted thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MintRecord {
    pub collection_id: String,
    /// Mint account address (unique key).
    pub mint: Pubkey,
    /// Paying / owning wallet.
    pub owner: Pubkey,
    /// Transaction signature (unique key, dedup anchor).
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// Position in mint order. Derived from the count of already-known
    /// records, not chain timestamps, so it is stable across re-scans.
    pub ordinal: u64,
    pub discovered_via: DiscoverySource,
    /// Wall-clock millis when the reconciler recorded this.
    pub recorded_at: u64,
}

/// Per-collection scan watermark. Advances monotonically and only after a
/// batch has been fully processed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanCursor {
    pub collection_id: String,
    pub last_signature: Signature,
    pub last_slot: u64,
    pub updated_at: u64,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub collection_id: String,
    pub from_genesis: bool,
    pub scanned_signatures: u64,
    pub new_records: u64,
    /// Transactions the chain reported as failed; never become records.
    pub errored_txs: u64,
    /// Transactions that matched the address but not the mint shape.
    pub unrecognized_txs: u64,
    pub duration_ms: u64,
}

/// Point-in-time price quote for the next mint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceQuote {
    pub collection_id: String,
    /// Fixed-point price in the smallest currency unit.
    pub price: u64,
    pub currency: String,
    pub phase: String,
    pub minted_count: u64,
}

/// Supply progress snapshot for UI/admin callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStatus {
    pub collection_id: String,
    pub version: u32,
    pub total_supply: u64,
    pub minted_count: u64,
    pub percent_minted: f64,
    pub active_phase: String,
    /// Mints remaining in the active phase.
    pub phase_remaining: u64,
    pub revealed: bool,
}
