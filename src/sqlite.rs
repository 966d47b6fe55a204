//! SQLite status backend.
//!
//! Features:
//! - hashes persisted in a single table, one row per field
//! - multi-field writes applied in one SQLite transaction
//! - publish/subscribe via in-memory channels (per-process)

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::backend::StatusBackend;
use crate::error::{KeyValueError, Result};
use crate::pubsub::{PubSub, Subscription};

/// SQLite implementation of StatusBackend.
///
/// Uses WAL mode so readers don't block the writer. Published messages are
/// in-process only (not shared across processes).
pub struct SqliteBackend {
    pool: SqlitePool,
    pubsub: PubSub,
}

impl SqliteBackend {
    /// Open or create a SQLite backend at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening SQLite status backend at {:?}", path);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| KeyValueError::Backend(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| KeyValueError::Backend(e.to_string()))?;

        let backend = Self {
            pool,
            pubsub: PubSub::new(1024),
        };

        backend.init_schema().await?;
        Ok(backend)
    }

    /// Create an in-memory SQLite backend (for testing).
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| KeyValueError::Backend(e.to_string()))?;

        // A second connection would open a second, empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| KeyValueError::Backend(e.to_string()))?;

        let backend = Self {
            pool,
            pubsub: PubSub::new(1024),
        };

        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS status_fields (
                hash TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (hash, field)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite schema initialized");
        Ok(())
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get current Unix timestamp.
    fn now_unix() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl StatusBackend for SqliteBackend {
    async fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM status_fields WHERE hash = ? AND field = ?")
                .bind(hash)
                .bind(field)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn hash_get_all(&self, hash: &str) -> Result<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT field, value FROM status_fields WHERE hash = ? ORDER BY field")
                .bind(hash)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    async fn hash_set(&self, hash: &str, fields: &[(String, String)]) -> Result<u64> {
        let now = Self::now_unix();
        let mut tx = self.pool.begin().await?;

        for (field, value) in fields {
            sqlx::query(
                r#"
                INSERT INTO status_fields (hash, field, value, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(hash, field) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(hash)
            .bind(field)
            .bind(value)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(hash, fields = fields.len(), "hash updated");
        Ok(fields.len() as u64)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u64> {
        let reached = self.pubsub.publish(channel, message);
        debug!(channel, reached, "published");
        Ok(reached)
    }

    fn subscribe(&self, channel: &str) -> Result<Subscription> {
        Ok(self.pubsub.subscribe(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "pypeline://cosmic-gpu-0/1/status";

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_sqlite_set_and_get() {
        let backend = SqliteBackend::in_memory().await.unwrap();

        let written = backend
            .hash_set(HASH, &fields(&[("STATUS", "0 idle"), ("#STAGES", "a b")]))
            .await
            .unwrap();
        assert_eq!(written, 2);

        assert_eq!(
            backend.hash_get(HASH, "STATUS").await.unwrap(),
            Some("0 idle".to_string())
        );
        assert!(backend.hash_get(HASH, "PULSE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_overwrite() {
        let backend = SqliteBackend::in_memory().await.unwrap();

        backend.hash_set(HASH, &fields(&[("STATUS", "0")])).await.unwrap();
        backend.hash_set(HASH, &fields(&[("STATUS", "1")])).await.unwrap();

        let all = backend.hash_get_all(HASH).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all.get("STATUS").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_sqlite_hashes_are_separate() {
        let backend = SqliteBackend::in_memory().await.unwrap();

        backend.hash_set(HASH, &fields(&[("A", "1")])).await.unwrap();
        backend
            .hash_set("pypeline://cosmic-gpu-0/0/status", &fields(&[("B", "2")]))
            .await
            .unwrap();

        let all = backend.hash_get_all(HASH).await.unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_sqlite_publish() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let mut subscription = backend.subscribe("pypeline:///set").unwrap();

        assert_eq!(
            backend.publish("pypeline:///set", "#CONTEXT=a").await.unwrap(),
            1
        );
        assert_eq!(subscription.recv().await.unwrap().payload, "#CONTEXT=a");
    }

    #[tokio::test]
    async fn test_sqlite_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.db");

        {
            let backend = SqliteBackend::open(&path).await.unwrap();
            backend
                .hash_set(HASH, &fields(&[("STATUS", "0 idle")]))
                .await
                .unwrap();
            backend.close().await;
        }

        let reopened = SqliteBackend::open(&path).await.unwrap();
        assert_eq!(
            reopened.hash_get(HASH, "STATUS").await.unwrap(),
            Some("0 idle".to_string())
        );
    }
}
