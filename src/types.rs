//! Shared primitive types for the launchpad engine.

/// Base-58 encoded account address. Kept as a string at the domain layer;
/// parsed into `solana_sdk::pubkey::Pubkey` only at the RPC boundary.
pub type Pubkey = String;

/// Transaction signature, base-58 encoded.
pub type Signature = String;
