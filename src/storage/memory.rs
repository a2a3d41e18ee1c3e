//! In-memory storage backend (no persistence)
//!
//! Used when no storage is configured and throughout the test suite.
//! Restart recovery is a no-op with this backend; everything else behaves
//! identically to a durable one.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::KvBackend;
use super::error::StorageResult;

/// In-memory key-value backend over a shared ordered map
#[derive(Default, Clone)]
pub struct MemoryBackend {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_batch(&self, batch: Vec<(String, String)>) -> StorageResult<()> {
        let mut entries = self.entries.write().await;
        for (key, value) in batch {
            entries.insert(key, value);
        }
        Ok(())
    }

    async fn delete_batch(&self, keys: Vec<String>) -> StorageResult<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(&key);
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn health_check(&self) -> StorageResult<String> {
        let count = self.entries.read().await.len();
        Ok(format!("In-memory storage operational ({count} keys)"))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
