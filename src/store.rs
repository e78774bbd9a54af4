//! Append-only trade persistence.
//!
//! The store is best-effort by policy: the chain transaction is the source of
//! truth, so callers downgrade insert failures to warnings once an on-chain
//! result exists. Records are never mutated or deleted here; truncation is an
//! administrative concern outside the engine.

use crate::errors::{Result, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

/// One persisted trade. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub tx_hash: String,
    pub wallet: String,
    pub from_symbol: String,
    pub to_symbol: String,
    pub amount_from: f64,
    pub amount_to: f64,
    pub unix_time: i64,
}

/// The persistence sink. Opened once per run and shared by every component
/// that records a trade; the engine owns its lifecycle.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Record a provisioned wallet (key and derived address).
    async fn insert_trader(&self, private_key: &str, address: &str) -> Result<()>;

    /// Append one trade record.
    async fn insert_trade(&self, record: &TradeRecord) -> Result<()>;

    /// All trades, oldest first.
    async fn fetch_trades(&self) -> Result<Vec<TradeRecord>>;

    /// Release the underlying connection. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// SQLite-backed trade store.
pub struct SqliteTradeStore {
    pool: SqlitePool,
}

impl SqliteTradeStore {
    /// Connect and ensure the schema exists.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|source| StoreError::ConnectFailed {
                url: url.to_string(),
                source,
            })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS traders (
                private_key TEXT NOT NULL,
                address     TEXT NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|source| StoreError::MigrationFailed { source })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                tx_hash     TEXT NOT NULL,
                wallet      TEXT NOT NULL,
                from_symbol TEXT NOT NULL,
                to_symbol   TEXT NOT NULL,
                amount_from REAL NOT NULL,
                amount_to   REAL NOT NULL,
                unix_time   INTEGER NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|source| StoreError::MigrationFailed { source })?;

        tracing::debug!(url, "Trade store connected");
        Ok(Self { pool })
    }
}

#[async_trait]
impl TradeStore for SqliteTradeStore {
    async fn insert_trader(&self, private_key: &str, address: &str) -> Result<()> {
        sqlx::query("INSERT INTO traders (private_key, address) VALUES (?1, ?2)")
            .bind(private_key)
            .bind(address)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::InsertFailed {
                table: "traders".into(),
                source,
            })?;
        Ok(())
    }

    async fn insert_trade(&self, record: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (tx_hash, wallet, from_symbol, to_symbol, amount_from, amount_to, unix_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&record.tx_hash)
        .bind(&record.wallet)
        .bind(&record.from_symbol)
        .bind(&record.to_symbol)
        .bind(record.amount_from)
        .bind(record.amount_to)
        .bind(record.unix_time)
        .execute(&self.pool)
        .await
        .map_err(|source| StoreError::InsertFailed {
            table: "trades".into(),
            source,
        })?;
        Ok(())
    }

    async fn fetch_trades(&self) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            "SELECT tx_hash, wallet, from_symbol, to_symbol, amount_from, amount_to, unix_time \
             FROM trades ORDER BY unix_time ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|source| StoreError::FetchFailed {
            table: "trades".into(),
            source,
        })?;

        Ok(rows
            .into_iter()
            .map(|row| TradeRecord {
                tx_hash: row.get("tx_hash"),
                wallet: row.get("wallet"),
                from_symbol: row.get("from_symbol"),
                to_symbol: row.get("to_symbol"),
                amount_from: row.get("amount_from"),
                amount_to: row.get("amount_to"),
                unix_time: row.get("unix_time"),
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        tracing::debug!("Trade store closed");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store for engine tests; counts inserts and can be poisoned
    //! to exercise the best-effort persistence policy.

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryTradeStore {
        pub trades: Mutex<Vec<TradeRecord>>,
        pub traders: Mutex<Vec<(String, String)>>,
        pub fail_inserts: Mutex<bool>,
        pub closed: Mutex<bool>,
    }

    impl MemoryTradeStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn poison(&self) {
            *self.fail_inserts.lock().unwrap() = true;
        }
    }

    #[async_trait]
    impl TradeStore for MemoryTradeStore {
        async fn insert_trader(&self, private_key: &str, address: &str) -> Result<()> {
            if *self.fail_inserts.lock().unwrap() {
                return Err(StoreError::InsertFailed {
                    table: "traders".into(),
                    source: sqlx::Error::PoolClosed,
                }
                .into());
            }
            self.traders
                .lock()
                .unwrap()
                .push((private_key.to_string(), address.to_string()));
            Ok(())
        }

        async fn insert_trade(&self, record: &TradeRecord) -> Result<()> {
            if *self.fail_inserts.lock().unwrap() {
                return Err(StoreError::InsertFailed {
                    table: "trades".into(),
                    source: sqlx::Error::PoolClosed,
                }
                .into());
            }
            self.trades.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn fetch_trades(&self) -> Result<Vec<TradeRecord>> {
            Ok(self.trades.lock().unwrap().clone())
        }

        async fn close(&self) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }
}
