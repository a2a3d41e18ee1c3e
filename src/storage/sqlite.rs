//! SQLite storage backend implementation
//!
//! Stores the relay's key-value space in a single `kv` table inside a local
//! SQLite file. WAL mode keeps restore-time reads cheap while the periodic
//! persist pass writes.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::KvBackend;
use super::error::{StorageError, StorageResult};

/// SQLite key-value backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database file and ensure the schema exists.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StorageError::SchemaFailed(e.to_string()))?;

        debug!("schema ready");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }
}

#[async_trait]
impl KvBackend for SqliteBackend {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn put_batch(&self, entries: Vec<(String, String)>) -> StorageResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for (key, value) in entries {
            sqlx::query(
                r#"
                INSERT INTO kv (key, value) VALUES (?, ?)
                ON CONFLICT (key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(&key)
            .bind(&value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete_batch(&self, keys: Vec<String>) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for key in keys {
            sqlx::query("DELETE FROM kv WHERE key = ?")
                .bind(&key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        // Key prefixes are fixed strings without LIKE metacharacters
        let rows = sqlx::query("SELECT key, value FROM kv WHERE key LIKE ? ORDER BY key")
            .bind(format!("{prefix}%"))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")))
            .collect())
    }

    async fn health_check(&self) -> StorageResult<String> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM kv")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("count");

        Ok(format!("SQLite at {}: {} keys", self.db_path, count))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing SQLite pool");
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn roundtrip_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::new(dir.path().join("kv.db")).await.unwrap();

        backend
            .put_batch(vec![
                ("monitor:HK1".into(), "{}".into()),
                ("monitor:HK2".into(), "{}".into()),
            ])
            .await
            .unwrap();

        assert_eq!(backend.scan_prefix("monitor:").await.unwrap().len(), 2);

        // Upsert replaces the value in place
        backend
            .put_batch(vec![("monitor:HK1".into(), "new".into())])
            .await
            .unwrap();
        assert_eq!(
            backend.get("monitor:HK1").await.unwrap().as_deref(),
            Some("new")
        );

        backend.delete_batch(vec!["monitor:HK1".into()]).await.unwrap();
        assert_eq!(backend.get("monitor:HK1").await.unwrap(), None);

        backend.close().await.unwrap();
    }
}
