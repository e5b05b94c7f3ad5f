//! Token-gating eligibility service.
//!
//! Reads the wallet's gating-token balance through the chain reader,
//! converts the raw integer amount by the mint's decimals and evaluates the
//! discount floors high-to-low. A fetch failure surfaces as `Unavailable`,
//! which callers must treat as retryable; it is never conflated with a
//! confirmed zero balance.

use crate::engine::chain::ChainReader;
use crate::engine::types::GatingConfig;
use crate::types::Pubkey;
use anyhow::Result;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Discount tier for a wallet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityTier {
    /// Balance at or above the full-discount floor: mint is free.
    Free,
    /// Balance at or above the partial floor, below the full floor.
    Discounted,
    FullPrice,
}

/// Point-in-time eligibility answer. Repeated calls may legitimately differ
/// as the on-chain balance moves; nothing here is persisted as authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EligibilityResult {
    Verified {
        wallet: Pubkey,
        /// Raw integer amount in base units.
        raw_balance: u64,
        /// Decimal-adjusted whole-token balance (truncated).
        whole_balance: u64,
        tier: EligibilityTier,
        discount_bps: u16,
        reason: String,
    },
    /// Balance could not be verified after bounded retries. Retryable;
    /// distinct from a confirmed zero balance.
    Unavailable { wallet: Pubkey, reason: String },
}

impl EligibilityResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, EligibilityResult::Verified { .. })
    }
}

/// Evaluate the discount floors against a raw balance.
///
/// Floors are denominated in whole tokens; the comparison happens on the
/// raw side (`floor * 10^decimals`) in u128 so no precision is lost.
pub fn evaluate_balance(
    wallet: &str,
    raw_balance: u64,
    decimals: u8,
    gating: &GatingConfig,
) -> EligibilityResult {
    let scale = 10u128.pow(decimals as u32);
    let raw = raw_balance as u128;
    let whole_balance = (raw / scale) as u64;
    let full_floor_raw = gating.full_discount_floor as u128 * scale;
    let partial_floor_raw = gating.partial_discount_floor as u128 * scale;

    let (tier, discount_bps, reason) = if raw >= full_floor_raw {
        (
            EligibilityTier::Free,
            10_000,
            format!(
                "holds {} whole tokens, at or above the free-mint floor of {}",
                whole_balance, gating.full_discount_floor
            ),
        )
    } else if raw >= partial_floor_raw {
        (
            EligibilityTier::Discounted,
            gating.partial_discount_bps,
            format!(
                "holds {} whole tokens, at or above the discount floor of {}",
                whole_balance, gating.partial_discount_floor
            ),
        )
    } else {
        (
            EligibilityTier::FullPrice,
            0,
            format!(
                "holds {} whole tokens, below the discount floor of {}",
                whole_balance, gating.partial_discount_floor
            ),
        )
    };

    EligibilityResult::Verified {
        wallet: wallet.to_string(),
        raw_balance,
        whole_balance,
        tier,
        discount_bps,
        reason,
    }
}

/// On-demand eligibility checks with a short-lived cache.
///
/// This path serves interactive UI and never waits on background scans;
/// each check is its own chain read.
pub struct EligibilityService {
    chain: Arc<dyn ChainReader>,
    cache: Cache<String, EligibilityResult>,
}

impl EligibilityService {
    pub fn new(chain: Arc<dyn ChainReader>, cache_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(cache_ttl)
            .build();
        Self { chain, cache }
    }

    /// Check a wallet against a collection's gating config.
    #[instrument(skip(self, gating), fields(wallet = %wallet, mint = %gating.token_mint))]
    pub async fn check(&self, wallet: &str, gating: &GatingConfig) -> Result<EligibilityResult> {
        let cache_key = format!("{}:{}", gating.token_mint, wallet);
        if let Some(cached) = self.cache.get(&cache_key).await {
            debug!("eligibility cache hit");
            return Ok(cached);
        }

        let result = match self.chain.token_balance(wallet, &gating.token_mint).await {
            Ok(Some(balance)) => {
                if balance.decimals != gating.decimals {
                    // The ledger is the source of truth for decimals; a
                    // mismatch means the config is stale.
                    warn!(
                        "configured decimals {} differ from on-chain decimals {} for {}",
                        gating.decimals, balance.decimals, gating.token_mint
                    );
                }
                evaluate_balance(wallet, balance.amount, balance.decimals, gating)
            }
            // Missing token account: the wallet simply never held the
            // gating token. Confirmed zero, full price.
            Ok(None) => evaluate_balance(wallet, 0, gating.decimals, gating),
            Err(err) => {
                warn!("balance fetch failed for {}: {:#}", wallet, err);
                EligibilityResult::Unavailable {
                    wallet: wallet.to_string(),
                    reason: "temporarily unable to verify token balance".to_string(),
                }
            }
        };

        if result.is_verified() {
            self.cache.insert(cache_key, result.clone()).await;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gating() -> GatingConfig {
        GatingConfig {
            token_mint: "GateToken11111111111111111111111111111111111".to_string(),
            decimals: 9,
            full_discount_floor: 1_000_000,
            partial_discount_floor: 100_000,
            partial_discount_bps: 5000,
        }
    }

    fn tier_of(result: &EligibilityResult) -> (EligibilityTier, u16) {
        match result {
            EligibilityResult::Verified {
                tier, discount_bps, ..
            } => (*tier, *discount_bps),
            EligibilityResult::Unavailable { .. } => panic!("expected verified result"),
        }
    }

    #[test]
    fn million_whole_tokens_at_nine_decimals_is_free_tier() {
        // Raw 1_000_000_000_000_000 over 9 decimals = 1,000,000 whole tokens.
        let result = evaluate_balance("wallet", 1_000_000_000_000_000, 9, &gating());
        assert_eq!(tier_of(&result), (EligibilityTier::Free, 10_000));
        match result {
            EligibilityResult::Verified { whole_balance, .. } => {
                assert_eq!(whole_balance, 1_000_000)
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn exactly_at_full_floor_is_free() {
        let raw = 1_000_000u64 * 1_000_000_000;
        let result = evaluate_balance("wallet", raw, 9, &gating());
        assert_eq!(tier_of(&result), (EligibilityTier::Free, 10_000));
    }

    #[test]
    fn one_base_unit_below_full_floor_is_partial() {
        let raw = 1_000_000u64 * 1_000_000_000 - 1;
        let result = evaluate_balance("wallet", raw, 9, &gating());
        assert_eq!(tier_of(&result), (EligibilityTier::Discounted, 5000));
    }

    #[test]
    fn one_base_unit_below_partial_floor_is_full_price() {
        let raw = 100_000u64 * 1_000_000_000 - 1;
        let result = evaluate_balance("wallet", raw, 9, &gating());
        assert_eq!(tier_of(&result), (EligibilityTier::FullPrice, 0));
    }

    #[test]
    fn zero_balance_is_full_price_not_an_error() {
        let result = evaluate_balance("wallet", 0, 9, &gating());
        assert_eq!(tier_of(&result), (EligibilityTier::FullPrice, 0));
    }

    #[test]
    fn thresholds_compare_decimal_adjusted_not_raw() {
        // 1,000,000 raw units at 9 decimals is 0.001 whole tokens; the raw
        // integer alone would clear the floor, the adjusted balance must not.
        let result = evaluate_balance("wallet", 1_000_000, 9, &gating());
        assert_eq!(tier_of(&result), (EligibilityTier::FullPrice, 0));
    }

    #[test]
    fn zero_decimal_token_compares_raw_directly() {
        let mut config = gating();
        config.decimals = 0;
        let result = evaluate_balance("wallet", 1_000_000, 0, &config);
        assert_eq!(tier_of(&result), (EligibilityTier::Free, 10_000));
    }
}
