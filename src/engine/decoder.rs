//! Mint-event decoder over parsed transactions.
//!
//! Classification is a tagged result, never positional indexing: a
//! transaction either carries a recognizable mint pattern, is chain-errored,
//! or is explicitly unrecognized and skipped with a warning upstream.

use crate::engine::chain::TransactionView;
use crate::types::Pubkey;
use serde::{Deserialize, Serialize};

const SPL_TOKEN_PROGRAM: &str = "spl-token";

/// A detected mint creation: the new mint account and the paying wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MintEvent {
    pub mint: Pubkey,
    pub owner: Pubkey,
}

/// Outcome of classifying one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    /// A mint creation with a complete account layout.
    Recognized(MintEvent),
    /// Superficially related to the collection but not a mint, or a mint
    /// pattern with a malformed layout. Skipped, never fatal.
    Unrecognized,
    /// The chain reports an execution error; must never yield a record.
    ChainError,
}

/// Classify a transaction against the mint-creation pattern: an spl-token
/// `initializeMint` (the new account assigned to the token program and
/// initialized), with a `mintTo` of a fresh token accepted as fallback.
pub fn classify(tx: &TransactionView) -> TxOutcome {
    if tx.failed {
        return TxOutcome::ChainError;
    }

    let owner = match &tx.fee_payer {
        Some(payer) => payer.clone(),
        // No parsed signer: the layout does not match what we expect.
        None => return TxOutcome::Unrecognized,
    };

    let mut fallback_mint: Option<String> = None;
    for instruction in &tx.instructions {
        if instruction.program != SPL_TOKEN_PROGRAM {
            continue;
        }
        let kind = instruction
            .parsed
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let mint = instruction
            .parsed
            .get("info")
            .and_then(|info| info.get("mint"))
            .and_then(|v| v.as_str());

        match kind {
            "initializeMint" | "initializeMint2" => {
                return match mint {
                    Some(mint) => TxOutcome::Recognized(MintEvent {
                        mint: mint.to_string(),
                        owner,
                    }),
                    None => TxOutcome::Unrecognized,
                };
            }
            "mintTo" | "mintToChecked" => {
                if fallback_mint.is_none() {
                    fallback_mint = mint.map(str::to_string);
                }
            }
            _ => {}
        }
    }

    match fallback_mint {
        Some(mint) => TxOutcome::Recognized(MintEvent { mint, owner }),
        None => TxOutcome::Unrecognized,
    }
}
