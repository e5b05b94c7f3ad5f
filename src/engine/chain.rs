//! Chain reader: the single I/O boundary to Solana RPC.
//!
//! Wraps signature listing, parsed transaction fetch, token account lookup
//! and account info behind the `ChainReader` trait so the reconciler and
//! eligibility service can run against an in-memory fake in tests. Retries
//! and rate limiting live here; callers above never see raw RPC errors,
//! only a final success or failure.

use crate::types::{Pubkey, Signature};
use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use solana_account_decoder::UiAccountData;
use solana_client::client_error::ClientErrorKind;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, UiInstruction, UiMessage,
    UiParsedInstruction, UiTransactionEncoding,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, instrument, warn};

/// One entry from the signature listing RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// Chain-reported execution error for this transaction.
    pub err: bool,
}

/// A parsed instruction reduced to what the mint decoder inspects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionView {
    /// Canonical program name from the parsed encoding, e.g. "spl-token".
    pub program: String,
    pub program_id: String,
    pub parsed: serde_json::Value,
}

/// A fetched transaction reduced to named fields. Replaces positional
/// account-array poking with an explicit shape the decoder can reject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionView {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// True when the chain reports an execution error.
    pub failed: bool,
    /// First signer (the paying wallet), when the message parsed.
    pub fee_payer: Option<Pubkey>,
    pub instructions: Vec<InstructionView>,
}

/// Raw gating-token balance as read from the wallet's token accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTokenBalance {
    /// Integer amount in base units; divide by `10^decimals` for the
    /// human-denominated balance.
    pub amount: u64,
    pub decimals: u8,
}

/// Minimal account view for existence/ownership checks.
#[derive(Debug, Clone)]
pub struct AccountView {
    pub owner: Pubkey,
    pub lamports: u64,
}

/// Read-only chain capability consumed by the reconciler and the
/// eligibility service.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Recent signatures for an address, newest first, optionally paginated
    /// with `before`.
    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureInfo>>;

    /// Fetch a parsed transaction. `None` when the node does not know the
    /// signature.
    async fn transaction(&self, signature: &str) -> Result<Option<TransactionView>>;

    /// Total balance of `mint` held by `owner` across its token accounts.
    /// `None` when the wallet has no token account for the mint, which is a
    /// confirmed zero balance, not an error.
    async fn token_balance(&self, owner: &str, mint: &str) -> Result<Option<RawTokenBalance>>;

    /// Account info, `None` when the account does not exist.
    async fn account_info(&self, address: &str) -> Result<Option<AccountView>>;
}

/// Production `ChainReader` over a nonblocking Solana RPC client, with
/// bounded retry and a request rate limiter in front of every call.
pub struct SolanaChainReader {
    rpc: Arc<RpcClient>,
    limiter: DefaultDirectRateLimiter,
    retry_attempts: usize,
}

impl SolanaChainReader {
    pub fn new(rpc_url: String, timeout: Duration, requests_per_second: u32) -> Self {
        let rpc = Arc::new(RpcClient::new_with_timeout(rpc_url, timeout));
        Self::with_client(rpc, requests_per_second)
    }

    pub fn with_client(rpc: Arc<RpcClient>, requests_per_second: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::new(10).unwrap()),
        );
        Self {
            rpc,
            limiter: RateLimiter::direct(quota),
            retry_attempts: 3,
        }
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(2))
            .take(self.retry_attempts)
    }
}

#[async_trait]
impl ChainReader for SolanaChainReader {
    #[instrument(skip(self), fields(address = %address))]
    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureInfo>> {
        let address = address
            .parse::<solana_sdk::pubkey::Pubkey>()
            .context("invalid scan address")?;
        let before = match before {
            Some(sig) => Some(
                sig.parse::<solana_sdk::signature::Signature>()
                    .context("invalid pagination signature")?,
            ),
            None => None,
        };

        let entries = Retry::spawn(self.retry_strategy(), || async {
            self.limiter.until_ready().await;
            let config = GetConfirmedSignaturesForAddress2Config {
                before,
                until: None,
                limit: Some(limit),
                commitment: Some(CommitmentConfig::confirmed()),
            };
            self.rpc
                .get_signatures_for_address_with_config(&address, config)
                .await
        })
        .await
        .context("failed to fetch signatures for address")?;

        debug!("fetched {} signatures", entries.len());
        Ok(entries
            .into_iter()
            .map(|entry| SignatureInfo {
                signature: entry.signature,
                slot: entry.slot,
                block_time: entry.block_time,
                err: entry.err.is_some(),
            })
            .collect())
    }

    #[instrument(skip(self), fields(signature = %signature))]
    async fn transaction(&self, signature: &str) -> Result<Option<TransactionView>> {
        let parsed_signature = signature
            .parse::<solana_sdk::signature::Signature>()
            .context("invalid transaction signature")?;

        let result = Retry::spawn(self.retry_strategy(), || async {
            self.limiter.until_ready().await;
            let config = RpcTransactionConfig {
                encoding: Some(UiTransactionEncoding::JsonParsed),
                commitment: Some(CommitmentConfig::confirmed()),
                max_supported_transaction_version: Some(0),
            };
            self.rpc
                .get_transaction_with_config(&parsed_signature, config)
                .await
        })
        .await;

        match result {
            Ok(tx) => Ok(Some(reduce_transaction(signature, tx))),
            Err(err) => match err.kind() {
                // The node answered but has no usable record of the
                // signature; callers skip it rather than fail the batch.
                ClientErrorKind::RpcError(_) => {
                    warn!("transaction {} not available: {}", signature, err);
                    Ok(None)
                }
                _ => Err(err).context("failed to fetch transaction"),
            },
        }
    }

    #[instrument(skip(self), fields(owner = %owner, mint = %mint))]
    async fn token_balance(&self, owner: &str, mint: &str) -> Result<Option<RawTokenBalance>> {
        let owner = owner
            .parse::<solana_sdk::pubkey::Pubkey>()
            .context("invalid wallet address")?;
        let mint_key = mint
            .parse::<solana_sdk::pubkey::Pubkey>()
            .context("invalid gating token mint")?;

        let accounts = Retry::spawn(self.retry_strategy(), || async {
            self.limiter.until_ready().await;
            self.rpc
                .get_token_accounts_by_owner(&owner, TokenAccountsFilter::Mint(mint_key))
                .await
        })
        .await
        .context("failed to fetch token accounts")?;

        let mut total: u64 = 0;
        let mut decimals: Option<u8> = None;
        for keyed in accounts {
            if let UiAccountData::Json(parsed) = keyed.account.data {
                let info = &parsed.parsed["info"];
                if let Some(amount) = info["tokenAmount"]["amount"].as_str() {
                    total = total.saturating_add(amount.parse::<u64>().unwrap_or(0));
                }
                if decimals.is_none() {
                    decimals = info["tokenAmount"]["decimals"]
                        .as_u64()
                        .map(|d| d as u8);
                }
            }
        }

        match decimals {
            Some(decimals) => Ok(Some(RawTokenBalance {
                amount: total,
                decimals,
            })),
            // No token account for this mint: confirmed zero.
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(address = %address))]
    async fn account_info(&self, address: &str) -> Result<Option<AccountView>> {
        let address = address
            .parse::<solana_sdk::pubkey::Pubkey>()
            .context("invalid account address")?;

        let response = Retry::spawn(self.retry_strategy(), || async {
            self.limiter.until_ready().await;
            self.rpc
                .get_account_with_commitment(&address, CommitmentConfig::confirmed())
                .await
        })
        .await
        .context("failed to fetch account info")?;

        Ok(response.value.map(|account| AccountView {
            owner: account.owner.to_string(),
            lamports: account.lamports,
        }))
    }
}

/// Reduce the RPC transaction envelope to the named fields the decoder
/// needs. Unparsed (raw/binary) instructions are dropped here; a message
/// that carries none will classify as unrecognized downstream.
fn reduce_transaction(
    signature: &str,
    tx: EncodedConfirmedTransactionWithStatusMeta,
) -> TransactionView {
    let failed = tx
        .transaction
        .meta
        .as_ref()
        .map(|meta| meta.err.is_some())
        .unwrap_or(false);

    let mut fee_payer = None;
    let mut instructions = Vec::new();
    if let EncodedTransaction::Json(ui_tx) = &tx.transaction.transaction {
        if let UiMessage::Parsed(message) = &ui_tx.message {
            fee_payer = message
                .account_keys
                .iter()
                .find(|key| key.signer)
                .map(|key| key.pubkey.clone());
            for instruction in &message.instructions {
                if let UiInstruction::Parsed(UiParsedInstruction::Parsed(parsed)) = instruction {
                    instructions.push(InstructionView {
                        program: parsed.program.clone(),
                        program_id: parsed.program_id.clone(),
                        parsed: parsed.parsed.clone(),
                    });
                }
            }
        }
    }

    TransactionView {
        signature: signature.to_string(),
        slot: tx.slot,
        block_time: tx.block_time,
        failed,
        fee_payer,
        instructions,
    }
}
