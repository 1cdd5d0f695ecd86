//! SQLite-backed repositories.
//!
//! All collections share one `items` table keyed by `(id, collection)` with
//! the entity stored as JSON text. Saves are upserts, so a row keeps its
//! rowid and therefore its list position.

use std::marker::PhantomData;
use std::str::FromStr;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use super::{Repository, StorageError};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id          TEXT NOT NULL,
    collection  TEXT NOT NULL,
    data        TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (id, collection)
);

CREATE INDEX IF NOT EXISTS idx_items_collection ON items(collection);
"#;

/// Connection pool for the shared `items` table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database named by `dsn`.
    ///
    /// Accepts `sqlite:<path>`, `sqlite://<path>` and `sqlite::memory:`.
    pub async fn open(dsn: &str) -> Result<Self, StorageError> {
        let in_memory = dsn.contains(":memory:");
        let opts = SqliteConnectOptions::from_str(dsn)?
            .create_if_missing(true)
            .journal_mode(if in_memory {
                SqliteJournalMode::Memory
            } else {
                SqliteJournalMode::Wal
            })
            .synchronous(SqliteSynchronous::Normal);

        // Each connection to `:memory:` is a separate database.
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await?;

        tracing::info!(dsn = dsn, "SQLite store opened");
        Ok(Self { pool })
    }

    /// A typed view over one collection.
    pub fn repository<T>(&self, collection: &'static str) -> SqliteRepository<T> {
        SqliteRepository {
            pool: self.pool.clone(),
            collection,
            _marker: PhantomData,
        }
    }
}

/// One collection inside the `items` table.
pub struct SqliteRepository<T> {
    pool: SqlitePool,
    collection: &'static str,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T> Repository<T> for SqliteRepository<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn save(&self, id: &str, value: T) -> Result<(), StorageError> {
        let data = serde_json::to_string(&value)?;
        sqlx::query(
            "INSERT INTO items (id, collection, data, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(id, collection) DO UPDATE SET
                data = excluded.data,
                updated_at = datetime('now')",
        )
        .bind(id)
        .bind(self.collection)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<T>, StorageError> {
        let data: Option<String> =
            sqlx::query_scalar("SELECT data FROM items WHERE id = ?1 AND collection = ?2")
                .bind(id)
                .bind(self.collection)
                .fetch_optional(&self.pool)
                .await?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<T>, StorageError> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT data FROM items WHERE collection = ?1 ORDER BY rowid")
                .bind(self.collection)
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StorageError::from))
            .collect()
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM items WHERE collection = ?1")
            .bind(self.collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
