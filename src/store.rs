//! Authoritative snapshot table and memoized broadcast payload
//!
//! `MonitorStore` maps host identity to the latest snapshot, bounded in
//! size. `BroadcastCache` memoizes the serialized all-hosts payload so the
//! fan-out cost is one serialization per logical change regardless of how
//! many consumers are connected.

use std::collections::HashMap;
use std::fmt;

use crate::MonitorSnapshot;
use crate::ordering::compare_identities;

/// Framing prefix consumers expect in front of the snapshot array
pub const BROADCAST_PREFIX: &str = "data: ";

/// A new identity was rejected because the store is at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded;

impl fmt::Display for CapacityExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor store is at capacity, new host rejected")
    }
}

impl std::error::Error for CapacityExceeded {}

/// Latest snapshot per host, capacity-bounded.
///
/// Updates to known hosts always succeed; new hosts are refused once the
/// cap is reached. There is deliberately no eviction.
pub struct MonitorStore {
    entries: HashMap<String, MonitorSnapshot>,
    max_entries: usize,
}

impl MonitorStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
        }
    }

    pub fn put(&mut self, snapshot: MonitorSnapshot) -> Result<(), CapacityExceeded> {
        if !self.entries.contains_key(&snapshot.name) && self.entries.len() >= self.max_entries {
            return Err(CapacityExceeded);
        }
        self.entries.insert(snapshot.name.clone(), snapshot);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MonitorSnapshot> {
        self.entries.get(name)
    }

    /// Returns whether the host was present
    pub fn delete(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// All snapshots in natural identity order
    pub fn all(&self) -> Vec<MonitorSnapshot> {
        let mut snapshots: Vec<_> = self.entries.values().cloned().collect();
        snapshots.sort_by(|a, b| compare_identities(&a.name, &b.name));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lazily rebuilt serialization of the full store, framed for consumers
#[derive(Default)]
pub struct BroadcastCache {
    payload: Option<String>,
    rebuild_count: u64,
}

impl BroadcastCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current framed payload, rebuilding it only if a mutation invalidated
    /// the memoized copy.
    pub fn payload(&mut self, store: &MonitorStore) -> &str {
        if self.payload.is_none() {
            let json = serde_json::to_string(&store.all())
                .unwrap_or_else(|_| String::from("[]"));
            self.payload = Some(format!("{BROADCAST_PREFIX}{json}"));
            self.rebuild_count += 1;
        }
        self.payload.as_deref().unwrap_or_default()
    }

    /// Must be called after every store mutation
    pub fn invalidate(&mut self) {
        self.payload = None;
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn snapshot(name: &str, observed_at: i64) -> MonitorSnapshot {
        MonitorSnapshot {
            name: name.to_string(),
            observed_at,
            ..Default::default()
        }
    }

    #[test]
    fn all_returns_natural_order() {
        let mut store = MonitorStore::new(16);
        for name in ["HK10", "HK2", "HK1", "US1"] {
            store.put(snapshot(name, 0)).unwrap();
        }

        let names: Vec<_> = store.all().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["HK1", "HK2", "HK10", "US1"]);
    }

    #[test]
    fn capacity_rejects_new_hosts_but_not_updates() {
        let mut store = MonitorStore::new(2);
        store.put(snapshot("HK1", 1)).unwrap();
        store.put(snapshot("HK2", 1)).unwrap();

        assert_eq!(store.put(snapshot("HK3", 1)), Err(CapacityExceeded));
        assert_eq!(store.len(), 2);
        // The rejected insert must not have disturbed existing entries
        assert!(store.get("HK1").is_some());
        assert!(store.get("HK3").is_none());

        // Updating a known host is always allowed
        store.put(snapshot("HK1", 2)).unwrap();
        assert_eq!(store.get("HK1").unwrap().observed_at, 2);
    }

    #[test]
    fn put_replaces_previous_snapshot() {
        let mut store = MonitorStore::new(4);
        store.put(snapshot("HK1", 1)).unwrap();
        store.put(snapshot("HK1", 2)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("HK1").unwrap().observed_at, 2);
    }

    #[test]
    fn delete_reports_presence() {
        let mut store = MonitorStore::new(4);
        store.put(snapshot("HK1", 1)).unwrap();

        assert!(store.delete("HK1"));
        assert!(!store.delete("HK1"));
        assert!(store.is_empty());
    }

    #[test]
    fn cache_memoizes_until_invalidated() {
        let mut store = MonitorStore::new(4);
        store.put(snapshot("HK1", 1)).unwrap();

        let mut cache = BroadcastCache::new();
        let first = cache.payload(&store).to_string();
        let second = cache.payload(&store).to_string();

        assert_eq!(first, second);
        assert_eq!(cache.rebuild_count(), 1);

        store.put(snapshot("HK2", 1)).unwrap();
        cache.invalidate();

        let third = cache.payload(&store).to_string();
        assert_ne!(first, third);
        assert!(third.contains("HK2"));
        assert_eq!(cache.rebuild_count(), 2);
    }

    #[test]
    fn payload_is_framed_with_prefix() {
        let store = MonitorStore::new(4);
        let mut cache = BroadcastCache::new();

        assert_eq!(cache.payload(&store), "data: []");
    }
}
