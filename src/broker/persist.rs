//! Snapshot persistence across restarts
//!
//! The sweep tick batches every stored snapshot into durable storage under
//! `monitor:<name>`. At startup, `restore` loads everything back, dropping
//! entries older than the retention window and anything that no longer
//! parses. Both directions are best-effort; per-key failures never abort
//! startup or a sweep.

use tracing::{debug, warn};

use crate::MonitorSnapshot;
use crate::storage::{KvBackend, MONITOR_PREFIX, StorageResult};
use crate::store::MonitorStore;

pub fn monitor_key(name: &str) -> String {
    format!("{MONITOR_PREFIX}{name}")
}

/// Write every current snapshot as one batched put. No-op when the store
/// is empty.
pub async fn persist(backend: &dyn KvBackend, store: &MonitorStore) -> StorageResult<()> {
    if store.is_empty() {
        return Ok(());
    }

    let mut batch = Vec::with_capacity(store.len());
    for snapshot in store.all() {
        match serde_json::to_string(&snapshot) {
            Ok(payload) => batch.push((monitor_key(&snapshot.name), payload)),
            Err(e) => warn!("skipping unserializable snapshot for {}: {e}", snapshot.name),
        }
    }

    debug!("persisting {} snapshots", batch.len());
    backend.put_batch(batch).await
}

/// Load persisted snapshots into the store, discarding entries older than
/// `retention_secs`. Discarded and corrupt keys are removed from durable
/// storage in one batched delete. Returns how many snapshots were loaded.
pub async fn restore(
    backend: &dyn KvBackend,
    store: &mut MonitorStore,
    now: i64,
    retention_secs: i64,
) -> StorageResult<usize> {
    let entries = backend.scan_prefix(MONITOR_PREFIX).await?;

    let mut loaded = 0;
    let mut expired: Vec<String> = Vec::new();

    for (key, payload) in entries {
        let snapshot = match serde_json::from_str::<MonitorSnapshot>(&payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("discarding corrupt persisted snapshot at {key}: {e}");
                expired.push(key);
                continue;
            }
        };

        if snapshot.observed_at <= now - retention_secs {
            debug!("discarding expired snapshot for {}", snapshot.name);
            expired.push(key);
            continue;
        }

        match store.put(snapshot) {
            Ok(()) => loaded += 1,
            Err(e) => warn!("restore skipped a snapshot: {e}"),
        }
    }

    if !expired.is_empty() {
        debug!("deleting {} expired persisted snapshots", expired.len());
        backend.delete_batch(expired).await?;
    }

    Ok(loaded)
}
