//! Durable key-value records on SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteQueryResult},
    Row,
};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, trace};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

const UPSERT: &str = r#"
    INSERT INTO records (key, value, updated_at) VALUES (?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET
        value = excluded.value,
        updated_at = excluded.updated_at
"#;

const INSERT_IF_ABSENT: &str = r#"
    INSERT INTO records (key, value, updated_at) VALUES (?, ?, ?)
    ON CONFLICT(key) DO NOTHING
"#;

const SWAP: &str = "UPDATE records SET value = ?, updated_at = ? WHERE key = ? AND value = ?";

/// Settings store backed by a single SQLite table
///
/// Every write is one statement, so a record is never observed half-written
/// even if the process dies mid-chunk. [`compare_and_swap`] is what the
/// single-flight lock is built on.
///
/// [`compare_and_swap`]: SettingsStore::compare_and_swap
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

fn db_error(action: &str) -> impl FnOnce(sqlx::Error) -> BridgeError + '_ {
    move |e| BridgeError::DatabaseError(format!("Failed to {}: {}", action, e))
}

impl SqliteSettingsStore {
    /// Open (or create) the database file at `db_path`
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid DB path: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(db_error("open settings database"))?;
        let store = Self::with_pool(pool).await?;

        debug!(path = ?db_path, "Opened settings store");
        Ok(store)
    }

    /// Private in-memory database; one connection so every query sees it
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_error("open in-memory database"))?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(db_error("create records table"))?;
        Ok(Self { pool })
    }

    async fn write(&self, sql: &str, key: &str, value: &str) -> Result<SqliteQueryResult> {
        sqlx::query(sql)
            .bind(key)
            .bind(value)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(db_error("write record"))
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.write(UPSERT, key, value).await?;
        trace!(key, bytes = value.len(), "Stored record");
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("read record"))?;
        Ok(row.map(|row| row.get(0)))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool> {
        let result = match expected {
            None => self.write(INSERT_IF_ABSENT, key, value).await?,
            Some(current) => sqlx::query(SWAP)
                .bind(value)
                .bind(chrono::Utc::now().timestamp())
                .bind(key)
                .bind(current)
                .execute(&self.pool)
                .await
                .map_err(db_error("swap record"))?,
        };

        let swapped = result.rows_affected() == 1;
        debug!(key, swapped, "Compare-and-swap");
        Ok(swapped)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete record"))?;
        trace!(key, "Deleted record");
        Ok(())
    }
}
