//! Storage abstraction for mint records and scan cursors.
//!
//! `MintStore` is the formal persistence contract; the reconciler only ever
//! talks to the trait. `SqliteMintStore` is the production backend,
//! `MemoryMintStore` backs tests and lets several collections' reconcilers
//! run in isolation.

use crate::engine::types::{DiscoverySource, MintRecord, ScanCursor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, Pool, Sqlite};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

/// Persistence contract for the reconciler's output.
#[async_trait]
pub trait MintStore: Send + Sync {
    /// Insert a record. Signatures and (collection, ordinal) pairs are
    /// unique; inserting a duplicate is an error, the reconciler dedups
    /// before calling this.
    async fn insert_record(&self, record: &MintRecord) -> Result<()>;

    /// Whether a signature has already produced a record.
    async fn contains_signature(&self, collection_id: &str, signature: &str) -> Result<bool>;

    /// All known signatures for a collection (dedup set warm-up).
    async fn known_signatures(&self, collection_id: &str) -> Result<Vec<String>>;

    /// Count of records for a collection; the next ordinal.
    async fn record_count(&self, collection_id: &str) -> Result<u64>;

    /// Records ordered by ordinal, optionally from `since_ordinal` on.
    async fn records_since(
        &self,
        collection_id: &str,
        since_ordinal: Option<u64>,
    ) -> Result<Vec<MintRecord>>;

    /// How many mints a wallet holds in a collection.
    async fn owner_mint_count(&self, collection_id: &str, owner: &str) -> Result<u64>;

    async fn load_cursor(&self, collection_id: &str) -> Result<Option<ScanCursor>>;

    /// Persist the cursor. Must only move forward; a save with an older
    /// slot is ignored.
    async fn save_cursor(&self, cursor: &ScanCursor) -> Result<()>;
}

const DB_FILE: &str = "./mint_ledger.db";

#[derive(FromRow)]
struct MintRecordRow {
    collection_id: String,
    mint: String,
    owner: String,
    signature: String,
    slot: i64,
    block_time: Option<i64>,
    ordinal: i64,
    discovered_via: String,
    recorded_at: i64,
}

impl MintRecordRow {
    fn into_record(self) -> Result<MintRecord> {
        Ok(MintRecord {
            collection_id: self.collection_id,
            mint: self.mint,
            owner: self.owner,
            signature: self.signature,
            slot: self.slot as u64,
            block_time: self.block_time,
            ordinal: self.ordinal as u64,
            discovered_via: self.discovered_via.parse()?,
            recorded_at: self.recorded_at as u64,
        })
    }
}

#[derive(FromRow)]
struct ScanCursorRow {
    collection_id: String,
    last_signature: String,
    last_slot: i64,
    updated_at: i64,
}

/// SQLite-backed mint ledger.
pub struct SqliteMintStore {
    pool: Pool<Sqlite>,
}

impl SqliteMintStore {
    pub async fn new() -> Result<Self> {
        Self::with_path(DB_FILE).await
    }

    pub async fn with_path(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{}?mode=rwc", path))
            .await
            .context("failed to connect to SQLite database")?;

        Self::create_schema(&pool).await?;
        info!("SqliteMintStore initialized and connected to {}", path);
        Ok(Self { pool })
    }

    async fn create_schema(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mint_records (
                collection_id TEXT NOT NULL,
                mint TEXT NOT NULL,
                owner TEXT NOT NULL,
                signature TEXT NOT NULL,
                slot INTEGER NOT NULL,
                block_time INTEGER,
                ordinal INTEGER NOT NULL,
                discovered_via TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                PRIMARY KEY (collection_id, mint),
                UNIQUE (collection_id, signature),
                UNIQUE (collection_id, ordinal)
            );
            "#,
        )
        .execute(pool)
        .await
        .context("failed to create mint_records table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan_cursors (
                collection_id TEXT PRIMARY KEY,
                last_signature TEXT NOT NULL,
                last_slot INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await
        .context("failed to create scan_cursors table")?;

        Ok(())
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MintStore for SqliteMintStore {
    async fn insert_record(&self, record: &MintRecord) -> Result<()> {
        debug!(
            "inserting mint record {} (ordinal {}) for collection {}",
            record.mint, record.ordinal, record.collection_id
        );
        sqlx::query(
            r#"
            INSERT INTO mint_records (
                collection_id, mint, owner, signature, slot, block_time,
                ordinal, discovered_via, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?);
            "#,
        )
        .bind(&record.collection_id)
        .bind(&record.mint)
        .bind(&record.owner)
        .bind(&record.signature)
        .bind(record.slot as i64)
        .bind(record.block_time)
        .bind(record.ordinal as i64)
        .bind(record.discovered_via.as_str())
        .bind(record.recorded_at as i64)
        .execute(&self.pool)
        .await
        .context("failed to insert mint record")?;
        Ok(())
    }

    async fn contains_signature(&self, collection_id: &str, signature: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM mint_records WHERE collection_id = ? AND signature = ? LIMIT 1;",
        )
        .bind(collection_id)
        .bind(signature)
        .fetch_optional(&self.pool)
        .await
        .context("failed to check signature")?;
        Ok(row.is_some())
    }

    async fn known_signatures(&self, collection_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT signature FROM mint_records WHERE collection_id = ?;")
                .bind(collection_id)
                .fetch_all(&self.pool)
                .await
                .context("failed to load known signatures")?;
        Ok(rows.into_iter().map(|(signature,)| signature).collect())
    }

    async fn record_count(&self, collection_id: &str) -> Result<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM mint_records WHERE collection_id = ?;")
                .bind(collection_id)
                .fetch_one(&self.pool)
                .await
                .context("failed to count mint records")?;
        Ok(count as u64)
    }

    async fn records_since(
        &self,
        collection_id: &str,
        since_ordinal: Option<u64>,
    ) -> Result<Vec<MintRecord>> {
        let rows: Vec<MintRecordRow> = sqlx::query_as(
            r#"
            SELECT * FROM mint_records
            WHERE collection_id = ? AND ordinal >= ?
            ORDER BY ordinal ASC;
            "#,
        )
        .bind(collection_id)
        .bind(since_ordinal.unwrap_or(0) as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch mint records")?;

        rows.into_iter().map(MintRecordRow::into_record).collect()
    }

    async fn owner_mint_count(&self, collection_id: &str, owner: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM mint_records WHERE collection_id = ? AND owner = ?;",
        )
        .bind(collection_id)
        .bind(owner)
        .fetch_one(&self.pool)
        .await
        .context("failed to count owner mints")?;
        Ok(count as u64)
    }

    async fn load_cursor(&self, collection_id: &str) -> Result<Option<ScanCursor>> {
        let row: Option<ScanCursorRow> =
            sqlx::query_as("SELECT * FROM scan_cursors WHERE collection_id = ?;")
                .bind(collection_id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to load scan cursor")?;

        Ok(row.map(|row| ScanCursor {
            collection_id: row.collection_id,
            last_signature: row.last_signature,
            last_slot: row.last_slot as u64,
            updated_at: row.updated_at as u64,
        }))
    }

    async fn save_cursor(&self, cursor: &ScanCursor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_cursors (collection_id, last_signature, last_slot, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(collection_id) DO UPDATE SET
                last_signature = excluded.last_signature,
                last_slot = excluded.last_slot,
                updated_at = excluded.updated_at
            WHERE excluded.last_slot >= scan_cursors.last_slot;
            "#,
        )
        .bind(&cursor.collection_id)
        .bind(&cursor.last_signature)
        .bind(cursor.last_slot as i64)
        .bind(cursor.updated_at as i64)
        .execute(&self.pool)
        .await
        .context("failed to save scan cursor")?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<String, Vec<MintRecord>>,
    cursors: HashMap<String, ScanCursor>,
}

/// In-memory `MintStore` for tests and dry runs.
#[derive(Default)]
pub struct MemoryMintStore {
    state: Mutex<MemoryState>,
}

impl MemoryMintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MintStore for MemoryMintStore {
    async fn insert_record(&self, record: &MintRecord) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let records = state
            .records
            .entry(record.collection_id.clone())
            .or_default();
        if records.iter().any(|r| r.signature == record.signature) {
            anyhow::bail!("duplicate signature {}", record.signature);
        }
        if records.iter().any(|r| r.ordinal == record.ordinal) {
            anyhow::bail!("duplicate ordinal {}", record.ordinal);
        }
        records.push(record.clone());
        Ok(())
    }

    async fn contains_signature(&self, collection_id: &str, signature: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .get(collection_id)
            .map(|records| records.iter().any(|r| r.signature == signature))
            .unwrap_or(false))
    }

    async fn known_signatures(&self, collection_id: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .get(collection_id)
            .map(|records| records.iter().map(|r| r.signature.clone()).collect())
            .unwrap_or_default())
    }

    async fn record_count(&self, collection_id: &str) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .get(collection_id)
            .map(|records| records.len() as u64)
            .unwrap_or(0))
    }

    async fn records_since(
        &self,
        collection_id: &str,
        since_ordinal: Option<u64>,
    ) -> Result<Vec<MintRecord>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<MintRecord> = state
            .records
            .get(collection_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.ordinal >= since_ordinal.unwrap_or(0))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|r| r.ordinal);
        Ok(records)
    }

    async fn owner_mint_count(&self, collection_id: &str, owner: &str) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .get(collection_id)
            .map(|records| records.iter().filter(|r| r.owner == owner).count() as u64)
            .unwrap_or(0))
    }

    async fn load_cursor(&self, collection_id: &str) -> Result<Option<ScanCursor>> {
        let state = self.state.lock().unwrap();
        Ok(state.cursors.get(collection_id).cloned())
    }

    async fn save_cursor(&self, cursor: &ScanCursor) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.cursors.get(&cursor.collection_id) {
            Some(existing) if existing.last_slot > cursor.last_slot => {}
            _ => {
                state
                    .cursors
                    .insert(cursor.collection_id.clone(), cursor.clone());
            }
        }
        Ok(())
    }
}

/// Build a record for insertion; shared by scan and direct submission.
pub fn new_mint_record(
    collection_id: &str,
    mint: &str,
    owner: &str,
    signature: &str,
    slot: u64,
    block_time: Option<i64>,
    ordinal: u64,
    discovered_via: DiscoverySource,
) -> MintRecord {
    MintRecord {
        collection_id: collection_id.to_string(),
        mint: mint.to_string(),
        owner: owner.to_string(),
        signature: signature.to_string(),
        slot,
        block_time,
        ordinal,
        discovered_via,
        recorded_at: chrono::Utc::now().timestamp_millis() as u64,
    }
}
