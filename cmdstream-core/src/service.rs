//! # Streaming Service
//!
//! The `StreamingService` is owned by the process that hosts peer streams. It keeps
//! one outbound command queue per attached peer and the [`ResponseRegistry`] that
//! correlates the acks those peers send back.
//!
//! The stream transport (the gRPC `Attach` handler in the gateway) calls [`attach`]
//! when a peer connects and drives the returned [`PeerConnection`]: it forwards
//! queued commands to the peer and hands inbound acks to
//! [`PeerConnection::handle_ack`]. Dropping the connection detaches the peer.
//!
//! [`attach`]: StreamingService::attach

use crate::{
    ack::CommandAck,
    command::CommandEnvelope,
    config::CoreConfig,
    error::CommandError,
    registry::ResponseRegistry,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc::{self, error::TrySendError};

#[derive(Debug)]
struct PeerEntry {
    connection_id: u64,
    commands: mpsc::Sender<CommandEnvelope>,
    connected_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

/// A snapshot of one attached peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub client_id: String,
    pub connection_id: u64,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A clonable handle to the peer streams and pending commands of this process.
///
/// Clones share all state. Each instance has its own registry, so several services
/// can coexist in one process (tests do exactly that to simulate separate hosts).
#[derive(Debug, Clone)]
pub struct StreamingService {
    peers: Arc<DashMap<String, PeerEntry>>,
    registry: ResponseRegistry,
    config: Arc<CoreConfig>,
    next_connection: Arc<AtomicU64>,
}

impl Default for StreamingService {
    fn default() -> Self {
        Self::new(Arc::new(CoreConfig::default()))
    }
}

impl StreamingService {
    pub fn new(config: Arc<CoreConfig>) -> Self {
        Self {
            peers: Arc::new(DashMap::new()),
            registry: ResponseRegistry::new(),
            config,
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &ResponseRegistry {
        &self.registry
    }

    /// Registers a live stream for `client_id`.
    ///
    /// A peer that attaches again replaces its previous stream; the old
    /// connection's command queue is closed and its later detach is ignored.
    pub fn attach(&self, client_id: &str) -> PeerConnection {
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (commands_tx, commands_rx) = mpsc::channel(self.config.peer_channel_buffer);
        let now = Utc::now();

        let previous = self.peers.insert(
            client_id.to_string(),
            PeerEntry {
                connection_id,
                commands: commands_tx,
                connected_at: now,
                last_seen: now,
            },
        );
        match previous {
            Some(old) => tracing::warn!(
                client_id,
                connection_id,
                replaced_connection_id = old.connection_id,
                "Peer re-attached; replacing its previous stream."
            ),
            None => tracing::info!(client_id, connection_id, "Peer attached."),
        }

        PeerConnection {
            client_id: client_id.to_string(),
            connection_id,
            commands: commands_rx,
            service: self.clone(),
        }
    }

    /// Removes the stream of `client_id` if it still belongs to `connection_id`.
    ///
    /// Pending commands of the peer are abandoned so their waiters fail fast.
    /// Returns `false` if the peer was already gone or has since re-attached.
    pub fn detach(&self, client_id: &str, connection_id: u64) -> bool {
        let removed = self
            .peers
            .remove_if(client_id, |_, entry| entry.connection_id == connection_id)
            .is_some();
        if removed {
            let abandoned = self.registry.abandon_peer(client_id);
            tracing::info!(client_id, connection_id, abandoned, "Peer detached.");
        }
        removed
    }

    pub fn is_attached(&self, client_id: &str) -> bool {
        self.peers.contains_key(client_id)
    }

    /// Lists the attached peers, sorted by client id.
    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self
            .peers
            .iter()
            .map(|entry| PeerInfo {
                client_id: entry.key().clone(),
                connection_id: entry.connection_id,
                connected_at: entry.connected_at,
                last_seen: entry.last_seen,
            })
            .collect();
        peers.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        peers
    }

    /// Routes an inbound ack to its waiter. See [`ResponseRegistry::fulfill`].
    pub fn handle_ack(&self, ack: CommandAck) -> bool {
        self.registry.fulfill(ack)
    }

    /// Fire-and-forget: queues `envelope` on the peer's stream.
    ///
    /// Never waits for queue space. Returns `false` if the peer is not attached, its
    /// stream has closed, or its queue is full.
    pub async fn send(&self, client_id: &str, envelope: CommandEnvelope) -> bool {
        let Some(commands) = self.command_sender(client_id) else {
            tracing::debug!(
                client_id,
                command_id = %envelope.command_id(),
                "Dropping fire-and-forget command for a peer that is not attached."
            );
            return false;
        };

        let command_id = envelope.command_id().clone();
        match commands.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(client_id, command_id = %command_id, "Failed to queue command: {}", describe(&e));
                false
            }
        }
    }

    /// Queues `envelope` on the peer's stream and waits up to `timeout` for its ack.
    ///
    /// The completion is registered before the write so an ack can never arrive
    /// ahead of its waiter. The write itself never waits: a peer whose queue is full
    /// fails with [`CommandError::Transport`] right away. Acks with
    /// `success == false` are returned, not raised.
    pub async fn send_and_wait(
        &self,
        client_id: &str,
        envelope: CommandEnvelope,
        timeout: Duration,
    ) -> Result<CommandAck, CommandError> {
        let commands = self
            .command_sender(client_id)
            .ok_or_else(|| CommandError::not_connected(client_id))?;

        let command_id = envelope.command_id().clone();
        let kind = envelope.payload().kind();
        let mut pending = self
            .registry
            .register(command_id.clone(), client_id, timeout)?;

        if let Err(e) = commands.try_send(envelope) {
            pending.reclaim();
            return Err(CommandError::Transport(format!(
                "cannot queue command {command_id} for client '{client_id}': {}",
                describe(&e)
            )));
        }
        tracing::debug!(client_id, command_id = %command_id, kind, "Command sent, awaiting ack.");

        match tokio::time::timeout(timeout, pending.recv()).await {
            Ok(Some(ack)) => Ok(ack),
            Ok(None) if !self.is_attached(client_id) => Err(CommandError::not_connected(client_id)),
            Ok(None) => Err(CommandError::Transport(format!(
                "pending completion for command {command_id} was dropped"
            ))),
            Err(_) => {
                pending.reclaim();
                tracing::warn!(client_id, command_id = %command_id, kind, ?timeout, "Command timed out.");
                Err(CommandError::Timeout {
                    command_id,
                    timeout,
                })
            }
        }
    }

    fn command_sender(&self, client_id: &str) -> Option<mpsc::Sender<CommandEnvelope>> {
        self.peers.get(client_id).map(|entry| entry.commands.clone())
    }

    fn touch(&self, client_id: &str, connection_id: u64) {
        if let Some(mut entry) = self.peers.get_mut(client_id) {
            if entry.connection_id == connection_id {
                entry.last_seen = Utc::now();
            }
        }
    }
}

fn describe<T>(err: &TrySendError<T>) -> &'static str {
    match err {
        TrySendError::Full(_) => "peer queue is full",
        TrySendError::Closed(_) => "peer stream is closed",
    }
}

/// One live stream of an attached peer, as seen by the stream transport.
///
/// It detaches the peer automatically when dropped, mirroring the lifetime of the
/// underlying network stream.
#[derive(Debug)]
pub struct PeerConnection {
    client_id: String,
    connection_id: u64,
    commands: mpsc::Receiver<CommandEnvelope>,
    service: StreamingService,
}

impl PeerConnection {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Receives the next command to write to the peer. Returns `None` once this
    /// connection has been replaced by a newer one.
    pub async fn next_command(&mut self) -> Option<CommandEnvelope> {
        self.commands.recv().await
    }

    /// Records an ack read from the peer and resolves its waiter, if any.
    pub fn handle_ack(&self, ack: CommandAck) -> bool {
        self.service.touch(&self.client_id, self.connection_id);
        self.service.handle_ack(ack)
    }

    /// Records a liveness signal from the peer.
    pub fn heartbeat(&self) {
        self.service.touch(&self.client_id, self.connection_id);
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.service.detach(&self.client_id, self.connection_id);
    }
}
