use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{sqlite::SqlitePool, FromRow};
use tracing::{debug, info, warn};

use crate::anomaly_detection::{HistoricalTransaction, TransactionHistory};
use crate::core::ClassifiedTransaction;

/// Result of a persistence attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new row was written
    Inserted,
    /// A row with the same hash already exists; nothing was written
    AlreadyPresent,
    /// The write failed; the pipeline continues
    Failed(String),
}

impl RecordOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RecordOutcome::Failed(_))
    }
}

/// Persisted transaction row
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub id: i64,
    pub hash: String,
    pub from_address: String,
    pub to_address: String,
    pub value_eth: f64,
    pub gas_price: f64,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl TransactionRow {
    pub fn observed_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
    }
}

/// SQLite-backed transaction ledger.
///
/// Each hash is stored at most once; repeated observations are no-ops.
#[derive(Debug, Clone)]
pub struct TransactionStore {
    pool: SqlitePool,
    is_memory: bool,
}

impl TransactionStore {
    pub async fn new() -> Result<Self> {
        Self::new_with_url("sqlite://./data/transactions.db?mode=rwc").await
    }

    pub async fn new_with_url(database_url: &str) -> Result<Self> {
        // normalize sqlite URLs: accept "sqlite:" or "sqlite://"
        let mut db_url = database_url.to_string();
        if db_url.starts_with("sqlite:") && !db_url.starts_with("sqlite://") {
            db_url = db_url.replacen("sqlite:", "sqlite://", 1);
        }

        // ensure parent directory exists for file-backed sqlite URLs
        if let Some(path) = db_url.strip_prefix("sqlite://") {
            let path_only = path.split_once('?').map(|(p, _)| p).unwrap_or(path);
            if path_only != ":memory:" && !path_only.is_empty() {
                if let Some(parent) = std::path::Path::new(path_only).parent() {
                    if !parent.as_os_str().is_empty() {
                        if let Err(e) = std::fs::create_dir_all(parent) {
                            warn!("Failed to create database dir {:?}: {}", parent, e);
                        }
                    }
                }
            }
        }

        // Avoid logging full DB URL (may contain secrets).
        let safe_db_url_info = if let Some((scheme, rest)) = db_url.split_once("://") {
            format!("{}://(redacted, len={})", scheme, rest.len())
        } else {
            "(invalid db_url format)".to_string()
        };
        info!(db = %safe_db_url_info, "[storage] connecting to database");
        let is_memory = db_url.contains(":memory:");

        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
        use std::str::FromStr;
        use std::time::Duration;

        let connect_options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| anyhow::anyhow!("Invalid database URL: {}", e))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // every in-memory connection is a separate database
        let pool_options = if is_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(8)
                .min_connections(1)
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(1800))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_options)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

        let store = Self { pool, is_memory };
        store.initialize_schema().await?;

        info!("Transaction store initialized");
        Ok(store)
    }

    pub fn is_in_memory(&self) -> bool {
        self.is_memory
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing database schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT UNIQUE NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                value_eth REAL NOT NULL,
                gas_price REAL NOT NULL,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create transactions table: {}", e))?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_transactions_from ON transactions (from_address, timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_transactions_to ON transactions (to_address, timestamp)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create index: {}", e))?;
        }

        Ok(())
    }

    /// Persist a classified transaction at most once per hash.
    ///
    /// Never returns an error: failures are reported through [`RecordOutcome::Failed`].
    pub async fn record(&self, tx: &ClassifiedTransaction) -> RecordOutcome {
        match self.try_record(tx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(hash = %tx.hash, "Failed to persist transaction: {}", e);
                RecordOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_record(&self, tx: &ClassifiedTransaction) -> Result<RecordOutcome> {
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM transactions WHERE hash = ?")
            .bind(&tx.hash)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            debug!(hash = %tx.hash, "transaction already recorded");
            return Ok(RecordOutcome::AlreadyPresent);
        }

        let mut db_tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO transactions (hash, from_address, to_address, value_eth, gas_price, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tx.hash)
        .bind(&tx.from)
        .bind(&tx.to)
        .bind(tx.value_eth)
        .bind(tx.gas_price)
        .bind(tx.timestamp.timestamp_millis())
        .execute(&mut *db_tx)
        .await;

        match inserted {
            Ok(_) => {
                db_tx.commit().await?;
                debug!(hash = %tx.hash, "transaction recorded");
                Ok(RecordOutcome::Inserted)
            }
            // lost a race with a concurrent writer for the same hash
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                if let Err(e) = db_tx.rollback().await {
                    warn!(hash = %tx.hash, "Rollback after duplicate insert failed: {}", e);
                }
                debug!(hash = %tx.hash, "duplicate insert rolled back");
                Ok(RecordOutcome::AlreadyPresent)
            }
            Err(e) => {
                db_tx.rollback().await?;
                Err(e.into())
            }
        }
    }

    pub async fn get(&self, hash: &str) -> Result<Option<TransactionRow>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, hash, from_address, to_address, value_eth, gas_price, timestamp FROM transactions WHERE hash = ?",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Transactions where `wallet` is sender or receiver, observed at or after `since`.
    pub async fn wallet_transactions(
        &self,
        wallet: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TransactionRow>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, hash, from_address, to_address, value_eth, gas_price, timestamp
            FROM transactions
            WHERE (from_address = ? OR to_address = ?) AND timestamp >= ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(wallet)
        .bind(wallet)
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TransactionHistory for TransactionStore {
    async fn wallet_history(
        &self,
        wallet: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<HistoricalTransaction>> {
        Ok(self
            .wallet_transactions(wallet, since)
            .await?
            .into_iter()
            .map(|row| HistoricalTransaction {
                timestamp: row.observed_at(),
                hash: row.hash,
                from_address: row.from_address,
                to_address: row.to_address,
                value_eth: row.value_eth,
            })
            .collect())
    }
}
