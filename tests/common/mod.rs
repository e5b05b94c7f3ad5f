//! Shared test fixtures: an in-memory chain reader and a collection config
//! matching the reference launch setup.

// Not every test binary uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use launchpad_engine::engine::chain::{
    AccountView, ChainReader, InstructionView, RawTokenBalance, SignatureInfo, TransactionView,
};
use launchpad_engine::engine::types::{
    CollectionConfig, GatingConfig, Phase, PhasePricing, RarityTier,
};
use nonempty::nonempty;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Scripted chain reader. Signatures are held newest-first, exactly as the
/// RPC returns them; transaction fetches can be failed per signature to
/// simulate transport errors.
#[derive(Default)]
pub struct MockChain {
    pub signatures: Mutex<Vec<SignatureInfo>>,
    pub transactions: Mutex<HashMap<String, TransactionView>>,
    pub failing_fetches: Mutex<HashSet<String>>,
    pub balances: Mutex<HashMap<String, RawTokenBalance>>,
    pub fail_balance_fetch: Mutex<bool>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a successful mint transaction, newest entries first.
    pub fn push_mint(&self, signature: &str, slot: u64, mint: &str, owner: &str) {
        self.push_entry(signature, slot, false);
        self.transactions.lock().unwrap().insert(
            signature.to_string(),
            mint_tx(signature, slot, mint, owner, false),
        );
    }

    /// Add a transaction the chain reports as failed.
    pub fn push_errored_mint(&self, signature: &str, slot: u64, mint: &str, owner: &str) {
        self.push_entry(signature, slot, true);
        self.transactions.lock().unwrap().insert(
            signature.to_string(),
            mint_tx(signature, slot, mint, owner, true),
        );
    }

    /// Add a transaction that touches the address but mints nothing.
    pub fn push_transfer(&self, signature: &str, slot: u64, owner: &str) {
        self.push_entry(signature, slot, false);
        self.transactions.lock().unwrap().insert(
            signature.to_string(),
            TransactionView {
                signature: signature.to_string(),
                slot,
                block_time: Some(slot as i64),
                failed: false,
                fee_payer: Some(owner.to_string()),
                instructions: vec![InstructionView {
                    program: "system".to_string(),
                    program_id: "11111111111111111111111111111111".to_string(),
                    parsed: json!({ "type": "transfer", "info": { "lamports": 5000 } }),
                }],
            },
        );
    }

    /// Repeat an existing signature in the listing, as a flaky RPC might.
    pub fn repeat_listing(&self, signature: &str) {
        let mut signatures = self.signatures.lock().unwrap();
        if let Some(entry) = signatures.iter().find(|e| e.signature == signature).cloned() {
            signatures.insert(0, entry);
        }
    }

    pub fn fail_fetch(&self, signature: &str) {
        self.failing_fetches
            .lock()
            .unwrap()
            .insert(signature.to_string());
    }

    pub fn clear_fetch_failures(&self) {
        self.failing_fetches.lock().unwrap().clear();
    }

    pub fn set_balance(&self, wallet: &str, amount: u64, decimals: u8) {
        self.balances
            .lock()
            .unwrap()
            .insert(wallet.to_string(), RawTokenBalance { amount, decimals });
    }

    fn push_entry(&self, signature: &str, slot: u64, err: bool) {
        self.signatures.lock().unwrap().insert(
            0,
            SignatureInfo {
                signature: signature.to_string(),
                slot,
                block_time: Some(slot as i64),
                err,
            },
        );
    }
}

fn mint_tx(signature: &str, slot: u64, mint: &str, owner: &str, failed: bool) -> TransactionView {
    TransactionView {
        signature: signature.to_string(),
        slot,
        block_time: Some(slot as i64),
        failed,
        fee_payer: Some(owner.to_string()),
        instructions: vec![InstructionView {
            program: "spl-token".to_string(),
            program_id: "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA".to_string(),
            parsed: json!({
                "type": "initializeMint",
                "info": { "mint": mint, "decimals": 0, "mintAuthority": owner }
            }),
        }],
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn signatures_for_address(
        &self,
        _address: &str,
        limit: usize,
        before: Option<&str>,
    ) -> anyhow::Result<Vec<SignatureInfo>> {
        let signatures = self.signatures.lock().unwrap();
        let start = match before {
            Some(before) => signatures
                .iter()
                .position(|e| e.signature == before)
                .map(|i| i + 1)
                .unwrap_or(signatures.len()),
            None => 0,
        };
        Ok(signatures.iter().skip(start).take(limit).cloned().collect())
    }

    async fn transaction(&self, signature: &str) -> anyhow::Result<Option<TransactionView>> {
        if self.failing_fetches.lock().unwrap().contains(signature) {
            anyhow::bail!("simulated RPC failure for {}", signature);
        }
        Ok(self.transactions.lock().unwrap().get(signature).cloned())
    }

    async fn token_balance(
        &self,
        owner: &str,
        _mint: &str,
    ) -> anyhow::Result<Option<RawTokenBalance>> {
        if *self.fail_balance_fetch.lock().unwrap() {
            anyhow::bail!("simulated balance fetch failure");
        }
        Ok(self.balances.lock().unwrap().get(owner).copied())
    }

    async fn account_info(&self, _address: &str) -> anyhow::Result<Option<AccountView>> {
        Ok(None)
    }
}

/// Reference config: free whitelist for the first 100, then a linear
/// 100 -> 1000 ramp to 2000, with the four-tier rarity split.
pub fn reference_config() -> CollectionConfig {
    CollectionConfig {
        collection_id: "exclusive".to_string(),
        version: 1,
        scan_address: "LaunchpadAuthority1111111111111111111111111".to_string(),
        currency: "LOS".to_string(),
        currency_decimals: 9,
        total_supply: 2000,
        phases: nonempty![
            Phase {
                name: "whitelist".to_string(),
                start: 0,
                end: 100,
                pricing: PhasePricing::Flat { price: 0 },
            },
            Phase {
                name: "public".to_string(),
                start: 100,
                end: 2000,
                pricing: PhasePricing::Curve {
                    price_start: 100,
                    price_end: 1000,
                    exponent: 1,
                },
            },
        ],
        rarity_tiers: vec![
            RarityTier {
                name: "Legendary".to_string(),
                start: 0,
                end: 10,
                token_allocation: 1000,
            },
            RarityTier {
                name: "Epic".to_string(),
                start: 10,
                end: 60,
                token_allocation: 500,
            },
            RarityTier {
                name: "Rare".to_string(),
                start: 60,
                end: 260,
                token_allocation: 250,
            },
            RarityTier {
                name: "Common".to_string(),
                start: 260,
                end: 2000,
                token_allocation: 100,
            },
        ],
        trait_categories: vec![],
        reveal_seed: Some("launch-seed".to_string()),
        reveal_threshold: 1900,
        gating: GatingConfig {
            token_mint: "GateToken11111111111111111111111111111111111".to_string(),
            decimals: 9,
            full_discount_floor: 1_000_000,
            partial_discount_floor: 100_000,
            partial_discount_bps: 5000,
        },
        max_mints_per_wallet: 5,
        allocation_vesting_days: 30,
        allocation_cliff_days: 7,
    }
}
