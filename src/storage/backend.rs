//! Storage backend trait definition
//!
//! The relay treats durable storage as a plain key-value space with
//! batched multi-key writes and prefix scans. Two key families exist:
//!
//! - `monitor:<name>` - raw snapshot JSON, written by the periodic persist
//!   pass and consumed once at startup for crash recovery;
//! - `host:<name>` - operator metadata JSON with unbounded retention.
//!
//! No transaction spans more than one batch; every batch is independently
//! safe to partially fail and retry on the next cycle.

use async_trait::async_trait;

use super::error::StorageResult;

/// Key prefix for persisted monitor snapshots
pub const MONITOR_PREFIX: &str = "monitor:";

/// Key prefix for host metadata records
pub const HOST_PREFIX: &str = "host:";

/// Trait for durable key-value backends
///
/// Implementations must be `Send + Sync`; they are shared across async
/// tasks behind an `Arc`.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read one value, `None` if the key is absent
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a batch of key-value pairs as one operation
    async fn put_batch(&self, entries: Vec<(String, String)>) -> StorageResult<()>;

    /// Delete a batch of keys as one operation; absent keys are ignored
    async fn delete_batch(&self, keys: Vec<String>) -> StorageResult<()>;

    /// All `(key, value)` pairs whose key starts with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, String)>>;

    /// Lightweight operational check, returns a human-readable status
    async fn health_check(&self) -> StorageResult<String>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
