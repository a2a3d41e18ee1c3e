//! MonitorBroker - the stateful connection broker and monitor store owner
//!
//! The broker is a single actor owning all mutable relay state: the
//! snapshot store, the offline flag set, the broadcast cache, and the
//! connection registry. Socket handlers and REST routes talk to it through
//! `BrokerHandle`; the actor processes one event at a time, so no two
//! mutations ever interleave.
//!
//! ## Event flow
//!
//! ```text
//!  producer WS ──┐
//!  consumer WS ──┼── BrokerCommand ──► MonitorBroker ──► per-connection
//!  REST routes ──┘        mpsc            (actor)          outbound mpsc
//!                                           │
//!                             sweep timer ──┘ (liveness + persist)
//! ```

pub mod messages;
pub mod persist;
pub mod registry;
pub mod sweep;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::Config;
use crate::decode;
use crate::notify::Notifier;
use crate::storage::{HOST_PREFIX, KvBackend, StorageError};
use crate::store::{BroadcastCache, MonitorStore};
use crate::{HostMetadataRecord, MonitorSnapshot};

use messages::{
    AUTH_ACK, BrokerCommand, BrokerStats, ConnectionId, InboundFrame, OutboundFrame,
    POLICY_VIOLATION, Role,
};
use registry::ConnectionRegistry;

/// Outbound queue depth per connection
const OUTBOUND_BUFFER: usize = 32;

/// Errors surfaced by broker operations
#[derive(Debug)]
pub enum BrokerError {
    /// The named host is not in the monitor store
    NotFound,

    /// Durable storage failed
    Storage(StorageError),

    /// The broker is gone or a response channel broke
    Internal(String),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::NotFound => write!(f, "host not found"),
            BrokerError::Storage(err) => write!(f, "storage failure: {}", err),
            BrokerError::Internal(msg) => write!(f, "broker unavailable: {}", msg),
        }
    }
}

impl std::error::Error for BrokerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrokerError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for BrokerError {
    fn from(err: StorageError) -> Self {
        BrokerError::Storage(err)
    }
}

/// Tunables the broker actor runs with
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    pub secret: String,
    pub max_hosts: usize,
    pub sweep_interval: Duration,
    pub stale_after_secs: i64,
    pub retention_secs: i64,
}

impl From<&Config> for BrokerOptions {
    fn from(config: &Config) -> Self {
        Self {
            secret: config.secret.clone(),
            max_hosts: config.max_hosts,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            stale_after_secs: config.stale_after_secs,
            retention_secs: config.retention_secs,
        }
    }
}

/// The broker actor. Constructed once per process; owns every piece of
/// mutable relay state.
pub struct MonitorBroker {
    options: BrokerOptions,

    store: MonitorStore,
    offline: HashSet<String>,
    cache: BroadcastCache,
    registry: ConnectionRegistry,

    backend: Arc<dyn KvBackend>,
    notifier: Notifier,

    command_rx: mpsc::Receiver<BrokerCommand>,

    /// At most one pending sweep at a time; `None` while idle
    sweep_deadline: Option<Instant>,
}

impl MonitorBroker {
    fn new(
        options: BrokerOptions,
        backend: Arc<dyn KvBackend>,
        notifier: Notifier,
        command_rx: mpsc::Receiver<BrokerCommand>,
    ) -> Self {
        let store = MonitorStore::new(options.max_hosts);
        Self {
            options,
            store,
            offline: HashSet::new(),
            cache: BroadcastCache::new(),
            registry: ConnectionRegistry::new(),
            backend,
            notifier,
            command_rx,
            sweep_deadline: None,
        }
    }

    /// Run the actor's main loop. Restores persisted snapshots before the
    /// first command is processed.
    #[instrument(skip(self))]
    async fn run(mut self) {
        let now = Utc::now().timestamp();
        match persist::restore(
            self.backend.as_ref(),
            &mut self.store,
            now,
            self.options.retention_secs,
        )
        .await
        {
            Ok(loaded) => {
                if loaded > 0 {
                    info!("restored {loaded} snapshots from durable storage");
                    self.cache.invalidate();
                }
            }
            Err(e) => error!("snapshot restore failed, starting empty: {e}"),
        }

        loop {
            let deadline = self.sweep_deadline;
            let sweep_timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                maybe_cmd = self.command_rx.recv() => {
                    match maybe_cmd {
                        Some(BrokerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = sweep_timer => {
                    self.sweep_deadline = None;
                    self.run_sweep().await;
                }
            }
        }

        // Final persist so a clean shutdown loses nothing
        if let Err(e) = persist::persist(self.backend.as_ref(), &self.store).await {
            error!("final persist failed: {e}");
        }
        if let Err(e) = self.backend.close().await {
            error!("error closing backend: {e}");
        }

        debug!("broker stopped");
    }

    async fn handle_command(&mut self, cmd: BrokerCommand) {
        match cmd {
            BrokerCommand::Connect { id, role, outbound } => {
                debug!("connection {id} opened as {role:?}");
                self.registry.insert(id, role, outbound);
            }

            BrokerCommand::Inbound { id, frame } => {
                self.handle_inbound(id, frame).await;
            }

            BrokerCommand::Disconnect { id } => {
                debug!("connection {id} closed");
                self.registry.remove(id);
            }

            BrokerCommand::FetchAll { respond_to } => {
                let _ = respond_to.send(self.store.all());
            }

            BrokerCommand::GetHostMetadata { respond_to } => {
                let _ = respond_to.send(self.host_metadata().await);
            }

            BrokerCommand::UpsertHostMetadata { record, respond_to } => {
                let _ = respond_to.send(self.upsert_metadata(record).await);
            }

            BrokerCommand::DeleteHost { name, respond_to } => {
                let _ = respond_to.send(self.delete_host(&name).await);
            }

            BrokerCommand::GetStats { respond_to } => {
                let _ = respond_to.send(BrokerStats {
                    hosts: self.store.len(),
                    producers: self.registry.count(Role::Producer),
                    consumers: self.registry.count(Role::Consumer),
                });
            }

            // Handled in the run loop
            BrokerCommand::Shutdown => {}
        }
    }

    /// Route one inbound frame. State is re-read from the registry here on
    /// every message; nothing about the connection is trusted from earlier
    /// events.
    async fn handle_inbound(&mut self, id: ConnectionId, frame: InboundFrame) {
        let (role, authenticated, outbound) = match self.registry.get(id) {
            Some(record) => (record.role, record.authenticated, record.outbound.clone()),
            None => {
                trace!("dropping frame from unknown/closed connection {id}");
                return;
            }
        };

        match role {
            Role::Producer if !authenticated => self.handle_handshake(id, frame),
            Role::Producer => self.ingest(id, frame),
            Role::Consumer => {
                let payload = self.cache.payload(&self.store).to_string();
                Self::send_to(id, &outbound, OutboundFrame::Text(payload));
            }
        }
    }

    /// First producer frame: byte-for-byte shared secret comparison.
    fn handle_handshake(&mut self, id: ConnectionId, frame: InboundFrame) {
        let Some(record) = self.registry.get(id) else {
            return;
        };
        let outbound = record.outbound.clone();

        if frame.as_bytes() == self.options.secret.as_bytes() {
            info!("producer {id} authenticated");
            self.registry.mark_authenticated(id);
            Self::send_to(id, &outbound, OutboundFrame::Text(AUTH_ACK.to_string()));
            self.schedule_sweep_if_absent();
        } else {
            warn!("producer {id} failed authentication, closing");
            Self::send_to(
                id,
                &outbound,
                OutboundFrame::Close {
                    code: POLICY_VIOLATION,
                    reason: "authentication failed".to_string(),
                },
            );
            // Closed means closed: no further frames are processed
            self.registry.remove(id);
        }
    }

    /// Authenticated producer frame: decode, store, invalidate, fan out.
    fn ingest(&mut self, id: ConnectionId, frame: InboundFrame) {
        let decoded = match frame {
            InboundFrame::Binary(data) => decode::decode_binary(&data),
            InboundFrame::Text(text) => decode::decode_text(&text),
        };

        let snapshot = match decoded {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Decode failures drop the frame but keep the connection
                warn!("producer {id}: dropping frame: {e}");
                return;
            }
        };

        let name = snapshot.name.clone();
        if let Err(e) = self.store.put(snapshot) {
            warn!("producer {id}: {e} ({name} dropped)");
            return;
        }
        trace!("stored snapshot for {name}");

        self.cache.invalidate();
        self.fan_out();
    }

    /// Push the current payload to every open consumer. A slow or broken
    /// consumer only loses its own delivery.
    fn fan_out(&mut self) {
        let payload = self.cache.payload(&self.store).to_string();
        for (id, outbound) in self.registry.consumers() {
            Self::send_to(id, outbound, OutboundFrame::Text(payload.clone()));
        }
    }

    fn send_to(id: ConnectionId, outbound: &mpsc::Sender<OutboundFrame>, frame: OutboundFrame) {
        if let Err(e) = outbound.try_send(frame) {
            debug!("send to connection {id} failed: {e}");
        }
    }

    fn schedule_sweep_if_absent(&mut self) {
        if self.sweep_deadline.is_none() {
            trace!("scheduling sweep in {:?}", self.options.sweep_interval);
            self.sweep_deadline = Some(Instant::now() + self.options.sweep_interval);
        }
    }

    /// One sweep tick: liveness evaluation, notification dispatch, persist,
    /// and conditional reschedule.
    async fn run_sweep(&mut self) {
        let now = Utc::now().timestamp();
        let transitions = sweep::evaluate(
            &self.store,
            &mut self.offline,
            now,
            self.options.stale_after_secs,
        );

        if !transitions.is_empty() {
            info!("sweep detected {} transitions", transitions.len());
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                sweep::dispatch(&notifier, transitions).await;
            });
        }

        if let Err(e) = persist::persist(self.backend.as_ref(), &self.store).await {
            error!("snapshot persist failed: {e}");
        }

        // Reschedule only while there is something to watch; otherwise the
        // timer lapses and the next producer auth restarts it.
        if !self.registry.is_empty() || !self.store.is_empty() {
            self.sweep_deadline = Some(Instant::now() + self.options.sweep_interval);
        } else {
            debug!("relay idle, letting sweep timer lapse");
        }
    }

    async fn host_metadata(&self) -> Result<Vec<HostMetadataRecord>, BrokerError> {
        let entries = self.backend.scan_prefix(HOST_PREFIX).await?;

        let mut records = Vec::with_capacity(entries.len());
        for (key, payload) in entries {
            match serde_json::from_str::<HostMetadataRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping corrupt metadata record at {key}: {e}"),
            }
        }

        records.sort_by(|a, b| crate::ordering::compare_identities(&a.name, &b.name));
        Ok(records)
    }

    async fn upsert_metadata(&self, record: HostMetadataRecord) -> Result<(), BrokerError> {
        let key = format!("{HOST_PREFIX}{}", record.name);
        let payload = serde_json::to_string(&record)
            .map_err(|e| BrokerError::Storage(StorageError::SerializationError(e.to_string())))?;

        self.backend.put_batch(vec![(key, payload)]).await?;
        Ok(())
    }

    async fn delete_host(&mut self, name: &str) -> Result<(), BrokerError> {
        if !self.store.delete(name) {
            return Err(BrokerError::NotFound);
        }

        self.offline.remove(name);
        self.cache.invalidate();
        self.backend
            .delete_batch(vec![persist::monitor_key(name)])
            .await?;

        info!("deleted host {name}");
        Ok(())
    }
}

/// Handle for talking to the MonitorBroker
#[derive(Clone)]
pub struct BrokerHandle {
    sender: mpsc::Sender<BrokerCommand>,
    next_connection_id: Arc<AtomicU64>,
}

impl BrokerHandle {
    /// Spawn the broker actor and return its handle.
    pub fn spawn(
        options: BrokerOptions,
        backend: Arc<dyn KvBackend>,
        notifier: Notifier,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let actor = MonitorBroker::new(options, backend, notifier, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate a process-unique id for a freshly upgraded socket
    pub fn allocate_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register an upgraded connection; returns the channel the socket task
    /// should drain toward the peer.
    pub async fn connect(&self, id: ConnectionId, role: Role) -> mpsc::Receiver<OutboundFrame> {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let _ = self
            .sender
            .send(BrokerCommand::Connect {
                id,
                role,
                outbound: outbound_tx,
            })
            .await;
        outbound_rx
    }

    pub async fn inbound(&self, id: ConnectionId, frame: InboundFrame) {
        let _ = self.sender.send(BrokerCommand::Inbound { id, frame }).await;
    }

    pub async fn disconnect(&self, id: ConnectionId) {
        let _ = self.sender.send(BrokerCommand::Disconnect { id }).await;
    }

    /// All current snapshots in natural order; empty if the broker is gone.
    pub async fn fetch_all(&self) -> Vec<MonitorSnapshot> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(BrokerCommand::FetchAll { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn get_host_metadata(&self) -> Result<Vec<HostMetadataRecord>, BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BrokerCommand::GetHostMetadata { respond_to: tx })
            .await
            .map_err(|e| BrokerError::Internal(e.to_string()))?;
        rx.await.map_err(|e| BrokerError::Internal(e.to_string()))?
    }

    pub async fn upsert_host_metadata(
        &self,
        record: HostMetadataRecord,
    ) -> Result<(), BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BrokerCommand::UpsertHostMetadata {
                record,
                respond_to: tx,
            })
            .await
            .map_err(|e| BrokerError::Internal(e.to_string()))?;
        rx.await.map_err(|e| BrokerError::Internal(e.to_string()))?
    }

    pub async fn delete_host(&self, name: impl Into<String>) -> Result<(), BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BrokerCommand::DeleteHost {
                name: name.into(),
                respond_to: tx,
            })
            .await
            .map_err(|e| BrokerError::Internal(e.to_string()))?;
        rx.await.map_err(|e| BrokerError::Internal(e.to_string()))?
    }

    pub async fn stats(&self) -> Option<BrokerStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BrokerCommand::GetStats { respond_to: tx })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Shut down the broker and wait for its final persist to complete
    pub async fn shutdown(&self) {
        let _ = self.sender.send(BrokerCommand::Shutdown).await;
        self.sender.closed().await;
    }
}
