//! Liveness sweep over the snapshot table
//!
//! Each pass compares every snapshot's observation time against now and
//! maintains the per-host offline flag set. A host produces at most one
//! notification per state change; repeat passes with unchanged state are
//! silent.

use std::collections::HashSet;

use futures::future::join_all;
use tracing::debug;

use crate::notify::{Notifier, Transition};
use crate::store::MonitorStore;

/// Evaluate one sweep pass, mutating the offline flag set and returning the
/// transitions it produced.
pub fn evaluate(
    store: &MonitorStore,
    offline: &mut HashSet<String>,
    now: i64,
    stale_after: i64,
) -> Vec<(String, Transition)> {
    let mut transitions = Vec::new();

    for snapshot in store.all() {
        let is_stale = snapshot.observed_at < now - stale_after;
        let flagged = offline.contains(&snapshot.name);

        if is_stale && !flagged {
            offline.insert(snapshot.name.clone());
            transitions.push((snapshot.name, Transition::Offline));
        } else if !is_stale && flagged {
            offline.remove(&snapshot.name);
            transitions.push((snapshot.name, Transition::Online));
        }
    }

    transitions
}

/// Dispatch one sweep's notifications concurrently. The notifier swallows
/// individual failures, so this never short-circuits.
pub async fn dispatch(notifier: &Notifier, transitions: Vec<(String, Transition)>) {
    if transitions.is_empty() {
        return;
    }

    debug!("dispatching {} transition notifications", transitions.len());

    join_all(
        transitions
            .iter()
            .map(|(name, transition)| notifier.notify(name, *transition)),
    )
    .await;
}
