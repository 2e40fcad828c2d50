//! SQLite key/value store
//!
//! A single `kv` table; writes are upserts so each key holds exactly one
//! value.

use crate::error::{Result, StorageError};
use async_trait::async_trait;
use cadence_core::KeyValueStore;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::debug;

// Embed migrations into binary
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Key/value store persisted in SQLite
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `database_url`
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g. `sqlite://cadence.db`)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, running pending migrations
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        debug!("SQLite key/value store ready");
        Ok(Self { pool })
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> Result<Self> {
        // A single connection so every query sees the same memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn upsert(&self, key: &str, value: &[u8]) -> Result<()> {
        let updated_at = chrono::Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<Vec<u8>, _>("value")))
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn write(&self, key: &str, value: &[u8]) -> cadence_core::Result<()> {
        Ok(self.upsert(key, value).await?)
    }

    async fn read(&self, key: &str) -> cadence_core::Result<Option<Vec<u8>>> {
        Ok(self.fetch(key).await?)
    }
}
