//! SQLite Persistence for Custody State
//!
//! Write-through mirror of groups, receipts, the refund slot and the fee
//! state, so a restarted service resumes where it left off. Uses
//! connection pooling via r2d2. The in-memory state stays authoritative;
//! this store is only read at startup.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::{StorageError, StorageResult};
use crate::custody::fees::FeeState;
use crate::custody::refund::RefundSlot;
use crate::types::{Group, Receipt, ReceiptStatus};

/// Everything the mirror can restore at startup
#[derive(Debug, Default)]
pub struct LoadedState {
    pub groups: Vec<Group>,
    pub receipts: Vec<Receipt>,
    pub refund_slot: Option<RefundSlot>,
    pub fees: Option<FeeState>,
}

/// SQLite-backed custody state store with connection pooling
pub struct SqliteStateStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStateStore {
    /// Create a store at the given database path, running migrations
    pub fn new<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn run_migrations(&self) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS groups (
                custody_address TEXT PRIMARY KEY,
                required INTEGER NOT NULL,
                capacity_sats INTEGER NOT NULL,
                current_balance_sats INTEGER NOT NULL DEFAULT 0,
                nonce INTEGER NOT NULL DEFAULT 0,
                keepers TEXT NOT NULL,
                cooldown_until INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS receipts (
                id TEXT PRIMARY KEY,
                custody_address TEXT NOT NULL,
                recipient TEXT NOT NULL,
                amount_sats INTEGER NOT NULL,
                status TEXT NOT NULL,
                withdraw_destination TEXT,
                btc_txid TEXT,
                btc_height INTEGER,
                escrow_units TEXT NOT NULL DEFAULT '0',
                escrow_fee_units TEXT NOT NULL DEFAULT '0',
                requested_at INTEGER NOT NULL,
                cleared_at INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_receipts_custody_address ON receipts(custody_address);
            CREATE INDEX IF NOT EXISTS idx_receipts_btc_txid ON receipts(btc_txid);

            CREATE TABLE IF NOT EXISTS refund_slot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                custody_address TEXT NOT NULL,
                btc_txid TEXT NOT NULL,
                expiry INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fee_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                mint_fee_bps INTEGER NOT NULL,
                burn_fee_bps INTEGER NOT NULL,
                accrued_units TEXT NOT NULL DEFAULT '0'
            );
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    /// Insert or replace a group
    pub fn upsert_group(&self, group: &Group) -> StorageResult<()> {
        let keepers = serde_json::to_string(&group.keepers)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;

        self.conn()?
            .execute(
                r#"
                INSERT OR REPLACE INTO groups
                    (custody_address, required, capacity_sats, current_balance_sats,
                     nonce, keepers, cooldown_until, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    group.custody_address,
                    group.required,
                    group.capacity_sats as i64,
                    group.current_balance_sats as i64,
                    group.nonce as i64,
                    keepers,
                    group.cooldown_until as i64,
                    group.created_at as i64,
                    group.updated_at as i64,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a group row
    pub fn delete_group(&self, custody_address: &str) -> StorageResult<()> {
        self.conn()?
            .execute(
                "DELETE FROM groups WHERE custody_address = ?1",
                params![custody_address],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    /// Insert or replace a receipt
    pub fn upsert_receipt(&self, receipt: &Receipt) -> StorageResult<()> {
        self.conn()?
            .execute(
                r#"
                INSERT OR REPLACE INTO receipts
                    (id, custody_address, recipient, amount_sats, status,
                     withdraw_destination, btc_txid, btc_height,
                     escrow_units, escrow_fee_units,
                     requested_at, cleared_at, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
                params![
                    receipt.id,
                    receipt.custody_address,
                    receipt.recipient,
                    receipt.amount_sats as i64,
                    receipt.status.to_string(),
                    receipt.withdraw_destination,
                    receipt.btc_txid,
                    receipt.btc_height.map(|h| h as i64),
                    receipt.escrow_units.to_string(),
                    receipt.escrow_fee_units.to_string(),
                    receipt.requested_at as i64,
                    receipt.cleared_at as i64,
                    receipt.created_at as i64,
                    receipt.updated_at as i64,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    /// Persist (or clear) the single refund slot
    pub fn save_refund_slot(&self, slot: Option<&RefundSlot>) -> StorageResult<()> {
        let conn = self.conn()?;
        match slot {
            Some(slot) => {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO refund_slot (id, custody_address, btc_txid, expiry)
                    VALUES (1, ?1, ?2, ?3)
                    "#,
                    params![slot.custody_address, slot.btc_txid, slot.expiry as i64],
                )
                .map_err(|e| StorageError::Database(e.to_string()))?;
            }
            None => {
                conn.execute("DELETE FROM refund_slot WHERE id = 1", [])
                    .map_err(|e| StorageError::Database(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Persist the fee state
    pub fn save_fees(&self, fees: &FeeState) -> StorageResult<()> {
        self.conn()?
            .execute(
                r#"
                INSERT OR REPLACE INTO fee_state (id, mint_fee_bps, burn_fee_bps, accrued_units)
                VALUES (1, ?1, ?2, ?3)
                "#,
                params![
                    fees.mint_fee_bps as i64,
                    fees.burn_fee_bps as i64,
                    fees.accrued_units.to_string(),
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    /// Load everything for startup recovery
    pub fn load_state(&self) -> StorageResult<LoadedState> {
        let conn = self.conn()?;
        let mut loaded = LoadedState::default();

        let mut stmt = conn
            .prepare("SELECT * FROM groups")
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let groups = stmt
            .query_map([], Self::row_to_group)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        for group in groups {
            loaded
                .groups
                .push(group.map_err(|e| StorageError::Database(e.to_string()))?);
        }

        let mut stmt = conn
            .prepare("SELECT * FROM receipts")
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let receipts = stmt
            .query_map([], Self::row_to_receipt)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        for receipt in receipts {
            loaded
                .receipts
                .push(receipt.map_err(|e| StorageError::Database(e.to_string()))?);
        }

        loaded.refund_slot = conn
            .query_row(
                "SELECT custody_address, btc_txid, expiry FROM refund_slot WHERE id = 1",
                [],
                |row| {
                    Ok(RefundSlot {
                        custody_address: row.get(0)?,
                        btc_txid: row.get(1)?,
                        expiry: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        loaded.fees = conn
            .query_row(
                "SELECT mint_fee_bps, burn_fee_bps, accrued_units FROM fee_state WHERE id = 1",
                [],
                |row| {
                    let accrued: String = row.get(2)?;
                    Ok(FeeState {
                        mint_fee_bps: row.get::<_, i64>(0)? as u64,
                        burn_fee_bps: row.get::<_, i64>(1)? as u64,
                        accrued_units: accrued.parse().unwrap_or(0),
                    })
                },
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(loaded)
    }

    fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<Group> {
        let keepers_json: String = row.get("keepers")?;
        let keepers = serde_json::from_str(&keepers_json).unwrap_or_default();

        Ok(Group {
            custody_address: row.get("custody_address")?,
            required: row.get("required")?,
            capacity_sats: row.get::<_, i64>("capacity_sats")? as u64,
            current_balance_sats: row.get::<_, i64>("current_balance_sats")? as u64,
            nonce: row.get::<_, i64>("nonce")? as u64,
            keepers,
            cooldown_until: row.get::<_, i64>("cooldown_until")? as u64,
            created_at: row.get::<_, i64>("created_at")? as u64,
            updated_at: row.get::<_, i64>("updated_at")? as u64,
        })
    }

    fn row_to_receipt(row: &rusqlite::Row) -> rusqlite::Result<Receipt> {
        let status_str: String = row.get("status")?;
        let status = status_str.parse().unwrap_or(ReceiptStatus::Cleared);
        let escrow_units: String = row.get("escrow_units")?;
        let escrow_fee_units: String = row.get("escrow_fee_units")?;

        Ok(Receipt {
            id: row.get("id")?,
            custody_address: row.get("custody_address")?,
            recipient: row.get("recipient")?,
            amount_sats: row.get::<_, i64>("amount_sats")? as u64,
            status,
            withdraw_destination: row.get("withdraw_destination")?,
            btc_txid: row.get("btc_txid")?,
            btc_height: row.get::<_, Option<i64>>("btc_height")?.map(|h| h as u64),
            escrow_units: escrow_units.parse().unwrap_or(0),
            escrow_fee_units: escrow_fee_units.parse().unwrap_or(0),
            requested_at: row.get::<_, i64>("requested_at")? as u64,
            cleared_at: row.get::<_, i64>("cleared_at")? as u64,
            created_at: row.get::<_, i64>("created_at")? as u64,
            updated_at: row.get::<_, i64>("updated_at")? as u64,
        })
    }
}
