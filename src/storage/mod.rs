//! Durable key-value storage for crash recovery and host metadata

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HOST_PREFIX, KvBackend, MONITOR_PREFIX};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteBackend;
