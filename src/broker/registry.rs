//! Connection registry and producer authentication state
//!
//! Authentication state lives on the connection record itself, never in a
//! handler task's locals: the broker re-reads the record at the top of
//! every message, so a recreated handler observes the same state the
//! previous one left behind.

use std::collections::HashMap;

use tokio::sync::mpsc;

use super::messages::{ConnectionId, OutboundFrame, Role};

/// Per-connection attachment record
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub role: Role,

    /// Producers only; consumers are stateless beyond their tag
    pub authenticated: bool,

    /// Channel the socket task drains toward the remote side
    pub outbound: mpsc::Sender<OutboundFrame>,
}

/// All open connections, keyed by id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionRecord>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ConnectionId, role: Role, outbound: mpsc::Sender<OutboundFrame>) {
        self.connections.insert(
            id,
            ConnectionRecord {
                role,
                authenticated: false,
                outbound,
            },
        );
    }

    /// Reconstruct the connection's attached state; `None` once closed
    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionRecord> {
        self.connections.get(&id)
    }

    pub fn mark_authenticated(&mut self, id: ConnectionId) {
        if let Some(record) = self.connections.get_mut(&id) {
            record.authenticated = true;
        }
    }

    /// Unconditionally release bookkeeping for a closing connection
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionRecord> {
        self.connections.remove(&id)
    }

    /// Outbound channels of all open consumers
    pub fn consumers(&self) -> impl Iterator<Item = (ConnectionId, &mpsc::Sender<OutboundFrame>)> {
        self.connections
            .iter()
            .filter(|(_, record)| record.role == Role::Consumer)
            .map(|(id, record)| (*id, &record.outbound))
    }

    pub fn count(&self, role: Role) -> usize {
        self.connections
            .values()
            .filter(|record| record.role == role)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
