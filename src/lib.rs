pub mod api;
pub mod broker;
pub mod config;
pub mod decode;
pub mod notify;
pub mod ordering;
pub mod storage;
pub mod store;

use serde::{Deserialize, Serialize};

/// Immutable per-snapshot host facts. Replaced wholesale whenever the
/// same host reports again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostStaticInfo {
    pub platform: String,
    pub arch: String,
    pub cpu: String,
    pub memory_total: u64,
    pub swap_total: u64,
    pub boot_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostDynamicState {
    pub cpu_usage: f64,
    pub memory_used: u64,
    pub swap_used: u64,
    /// Cumulative network counters since boot (bytes)
    pub net_rx_total: u64,
    pub net_tx_total: u64,
    /// Instantaneous network rates (bytes/sec)
    pub net_rx_rate: u64,
    pub net_tx_rate: u64,
    pub uptime_secs: u64,
    pub load_avg: [f64; 3],
}

/// One host's current snapshot: static facts, dynamic metrics, and the
/// Unix-seconds timestamp at which the agent observed them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// Host identity; the natural key for all per-host state
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub system: HostStaticInfo,

    #[serde(default)]
    pub metrics: HostDynamicState,

    /// Unix seconds at observation time
    #[serde(default)]
    pub observed_at: i64,
}

/// Operator-maintained per-host metadata. Lives in its own durable key
/// space (`host:<name>`), unrelated to snapshot lifecycle, never expires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostMetadataRecord {
    pub name: String,

    /// Renewal due date, operator-entered text (opaque to the relay)
    #[serde(default)]
    pub due_time: String,

    #[serde(default)]
    pub buy_url: String,

    #[serde(default)]
    pub seller: String,

    /// Price as displayed, currency included (opaque to the relay)
    #[serde(default)]
    pub price: String,
}
