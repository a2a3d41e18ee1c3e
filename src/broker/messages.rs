//! Message types for broker communication
//!
//! Socket handlers and REST routes never touch broker state directly; they
//! send `BrokerCommand`s over an mpsc channel and get answers back on
//! oneshot channels. Outbound traffic to a connection goes through that
//! connection's own mpsc sender so the broker never blocks on a socket.

use tokio::sync::{mpsc, oneshot};

use crate::{HostMetadataRecord, MonitorSnapshot};

use super::BrokerError;

/// Identifies one open socket for the lifetime of the process
pub type ConnectionId = u64;

/// WebSocket close code sent on a failed producer handshake
pub const POLICY_VIOLATION: u16 = 1008;

/// Plaintext acknowledgement sent after a successful producer handshake
pub const AUTH_ACK: &str = "auth success";

/// Role a connection was accepted under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Authenticated agent uploading snapshots
    Producer,

    /// Viewer receiving the fleet payload
    Consumer,
}

/// Raw frame received from a connection
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Binary(Vec<u8>),
    Text(String),
}

impl InboundFrame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            InboundFrame::Binary(data) => data,
            InboundFrame::Text(text) => text.as_bytes(),
        }
    }
}

/// Frame the broker asks a socket task to deliver
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Text(String),

    /// Close the socket with the given code; the task stops writing after this
    Close { code: u16, reason: String },
}

/// Counters exposed on the health endpoint
#[derive(Debug, Clone, Default)]
pub struct BrokerStats {
    pub hosts: usize,
    pub producers: usize,
    pub consumers: usize,
}

/// Commands that can be sent to the MonitorBroker
#[derive(Debug)]
pub enum BrokerCommand {
    /// A socket finished its upgrade and is ready to receive frames
    Connect {
        id: ConnectionId,
        role: Role,
        outbound: mpsc::Sender<OutboundFrame>,
    },

    /// A frame arrived on an open connection
    Inbound {
        id: ConnectionId,
        frame: InboundFrame,
    },

    /// The socket closed or errored; release all bookkeeping
    Disconnect { id: ConnectionId },

    /// All current snapshots in natural order
    FetchAll {
        respond_to: oneshot::Sender<Vec<MonitorSnapshot>>,
    },

    /// All host metadata records; corrupt rows are skipped
    GetHostMetadata {
        respond_to: oneshot::Sender<Result<Vec<HostMetadataRecord>, BrokerError>>,
    },

    /// Write/overwrite one metadata record
    UpsertHostMetadata {
        record: HostMetadataRecord,
        respond_to: oneshot::Sender<Result<(), BrokerError>>,
    },

    /// Remove a host from the store, flags, and durable snapshot storage
    DeleteHost {
        name: String,
        respond_to: oneshot::Sender<Result<(), BrokerError>>,
    },

    /// Health counters
    GetStats {
        respond_to: oneshot::Sender<BrokerStats>,
    },

    /// Gracefully shut down the broker (final persist included)
    Shutdown,
}
