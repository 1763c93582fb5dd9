//! # gRPC Service Implementation
//!
//! This module defines the gRPC server and its implementation of the
//! `CommandStreamService`.
//!
//! ### Architecture
//!
//! - **Peer streams**: A peer opens `Attach`, a bidirectional stream. The first
//!   frame names the peer; from then on the gateway writes commands to the peer and
//!   reads its acks and heartbeats. One task per stream does both, and the peer is
//!   detached from the [`StreamingService`] as soon as that task ends.
//!
//! - **Commanding peers of this gateway from elsewhere**: `ExecuteCommandSync` and
//!   `SendCommand` run the ordinary same-process dispatch against this gateway's
//!   registry. Failures of `ExecuteCommandSync` travel back inside the ack, encoded
//!   with the reserved error codes, so the calling gateway can raise the same typed
//!   errors as a local dispatch.
//!
//! - **Janitor**: A background task periodically sweeps pending completions that are
//!   still registered `stale-pending-secs` after their deadline.

mod conversions;

use crate::{
    bridge::SyncRpcBridge,
    config::GatewayConfig,
    error::GatewayError,
    grpc::proto::cmdstream::v1::{
        self as pb,
        command_stream_service_server::{CommandStreamService, CommandStreamServiceServer},
        peer_message,
    },
};
use anyhow::Result;
use cmdstream_core::{
    CommandAck, CommandEnvelope, PeerConnection, PeerRouter, StaticPeerDirectory,
    StreamingService,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::mpsc, sync::watch};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{transport::Server, Request, Response, Status, Streaming};

/// Generated protobuf code.
pub mod proto {
    pub mod cmdstream {
        pub mod v1 {
            tonic::include_proto!("cmdstream.v1");
        }
    }
}

/// A container for the application's shared, thread-safe state.
///
/// It is cloned into each gRPC service instance, allowing all RPC handlers to
/// access the same underlying components.
#[derive(Clone)]
pub struct AppState {
    /// The peer streams and pending commands hosted by this gateway.
    pub service: StreamingService,
    /// The gateway's configuration.
    pub config: Arc<GatewayConfig>,
}

/// The gRPC server implementation for the `CommandStreamService`.
pub struct GatewayServer {
    /// The shared application state.
    state: AppState,
}

impl GatewayServer {
    /// Creates a new `GatewayServer` instance.
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

/// A handle to a running gateway.
///
/// Besides shutdown, it exposes the local [`StreamingService`] and a
/// [`PeerRouter`] so code embedded in the gateway process can command peers.
pub struct GatewayHandle {
    pub service: StreamingService,
    pub router: PeerRouter,
    pub local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl GatewayHandle {
    /// Signals the gRPC server and the janitor to stop.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// The main entry point to initialize and start the gRPC server and all background services.
pub async fn start(config: &GatewayConfig) -> Result<GatewayHandle> {
    // --- 1. Initialize dependencies ---
    let config = Arc::new(config.clone());
    let service = StreamingService::new(Arc::new(config.core.clone()));
    let directory = StaticPeerDirectory::new(config.gateway.peers.clone());
    let bridge = SyncRpcBridge::new(config.gateway.bridge.clone());
    let router = PeerRouter::new(service.clone(), Arc::new(directory), Arc::new(bridge));

    let addr: SocketAddr = format!("{}:{}", config.gateway.grpc.host, config.gateway.grpc.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // --- 2. Spawn the janitor ---
    tokio::spawn(run_janitor(
        service.clone(),
        Duration::from_secs(config.gateway.janitor_interval_secs.max(1)),
        config.core.stale_pending_after(),
        shutdown_rx.clone(),
    ));

    // --- 3. Set up the gRPC server ---
    let app_state = AppState {
        service: service.clone(),
        config,
    };
    let grpc_server = Server::builder()
        .add_service(CommandStreamServiceServer::new(GatewayServer::new(app_state)));

    tracing::info!("Command stream gateway listening on {}", local_addr);

    let mut server_shutdown = shutdown_rx;
    tokio::spawn(async move {
        let incoming = TcpListenerStream::new(listener);
        let signal = async move {
            let _ = server_shutdown.changed().await;
        };
        if let Err(e) = grpc_server.serve_with_incoming_shutdown(incoming, signal).await {
            tracing::error!("gRPC server failed: {}", e);
        }
    });

    Ok(GatewayHandle {
        service,
        router,
        local_addr,
        shutdown: shutdown_tx,
    })
}

async fn run_janitor(
    service: StreamingService,
    interval: Duration,
    stale_after: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let swept = service.registry().sweep_stale(stale_after);
                if swept > 0 {
                    tracing::warn!(swept, "Janitor removed stale pending completions.");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!("Janitor stopped.");
}

/// Decodes the command carried by an RPC request.
fn decode_command(frame: Option<pb::CommandFrame>) -> Result<CommandEnvelope, GatewayError> {
    let frame = frame.ok_or_else(|| GatewayError::InvalidArgument("command is required".to_string()))?;
    Ok(CommandEnvelope::try_from(frame)?)
}

fn require_client_id(client_id: &str) -> Result<(), GatewayError> {
    if client_id.is_empty() {
        return Err(GatewayError::InvalidArgument("client_id is required".to_string()));
    }
    Ok(())
}

/// Applies one inbound frame of an attached peer.
fn handle_peer_message(connection: &PeerConnection, message: pb::PeerMessage) {
    match message.kind {
        Some(peer_message::Kind::Ack(ack)) => {
            connection.handle_ack(CommandAck::from(ack));
        }
        Some(peer_message::Kind::Heartbeat(_)) => connection.heartbeat(),
        Some(peer_message::Kind::Hello(_)) => tracing::warn!(
            client_id = connection.client_id(),
            "Ignoring repeated Hello on an attached stream."
        ),
        None => tracing::debug!(client_id = connection.client_id(), "Ignoring empty peer frame."),
    }
}

#[tonic::async_trait]
impl CommandStreamService for GatewayServer {
    type AttachStream = ReceiverStream<Result<pb::CommandFrame, Status>>;

    /// Attaches a peer and serves its bidirectional stream.
    ///
    /// Commands queued for the peer are written to the response stream; acks read
    /// from the request stream resolve their waiters. The peer is detached when
    /// either direction closes.
    async fn attach(
        &self,
        request: Request<Streaming<pb::PeerMessage>>,
    ) -> Result<Response<Self::AttachStream>, Status> {
        let mut inbound = request.into_inner();

        let client_id = match inbound.message().await? {
            Some(pb::PeerMessage {
                kind: Some(peer_message::Kind::Hello(hello)),
            }) if !hello.client_id.is_empty() => hello.client_id,
            _ => {
                return Err(Status::invalid_argument(
                    "The first frame of an Attach stream must be a Hello with a client_id",
                ))
            }
        };
        tracing::info!("Received Attach request for client: {}", client_id);

        let mut connection = self.state.service.attach(&client_id);
        let (tx, rx) = mpsc::channel(self.state.config.core.peer_channel_buffer);

        tokio::spawn(async move {
            // At most one frame waits for room on the response stream; acks keep
            // being read meanwhile.
            let mut outgoing: Option<pb::CommandFrame> = None;
            loop {
                tokio::select! {
                    frame = inbound.message() => match frame {
                        Ok(Some(message)) => handle_peer_message(&connection, message),
                        Ok(None) => {
                            tracing::info!("Client {} closed its stream.", client_id);
                            break;
                        }
                        Err(status) => {
                            tracing::warn!("Stream of client {} failed: {}", client_id, status);
                            break;
                        }
                    },
                    permit = tx.reserve(), if outgoing.is_some() => match permit {
                        Ok(permit) => {
                            if let Some(frame) = outgoing.take() {
                                permit.send(Ok(frame));
                            }
                        }
                        Err(_) => {
                            tracing::warn!("Client {} disconnected while a command was in flight.", client_id);
                            break;
                        }
                    },
                    command = connection.next_command(), if outgoing.is_none() => match command {
                        Some(envelope) => outgoing = Some(pb::CommandFrame::from(envelope)),
                        None => {
                            tracing::info!("Stream of client {} was replaced by a newer one.", client_id);
                            break;
                        }
                    },
                    _ = tx.closed() => {
                        tracing::info!("Client {} stopped reading commands.", client_id);
                        break;
                    }
                }
            }
            // Dropping the connection detaches the peer.
            drop(connection);
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    /// Delivers a command to a local peer and waits for its ack.
    async fn execute_command_sync(
        &self,
        request: Request<pb::ExecuteCommandRequest>,
    ) -> Result<Response<pb::CommandAck>, Status> {
        let req = request.into_inner();
        require_client_id(&req.client_id)?;
        let envelope = decode_command(req.command)?;
        let timeout = match req.timeout_ms {
            0 => self.state.config.core.default_timeout(),
            ms => Duration::from_millis(ms),
        };
        let command_id = envelope.command_id().clone();
        tracing::info!(
            client_id = %req.client_id,
            command_id = %command_id,
            kind = envelope.payload().kind(),
            "Received ExecuteCommandSync request."
        );

        let ack = match self
            .state
            .service
            .send_and_wait(&req.client_id, envelope, timeout)
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                tracing::info!(client_id = %req.client_id, command_id = %command_id, error = %e, "Command failed.");
                CommandAck::from_error(command_id, &e)
            }
        };

        Ok(Response::new(ack.into()))
    }

    /// Queues a command for a local peer without waiting for its ack.
    async fn send_command(
        &self,
        request: Request<pb::SendCommandRequest>,
    ) -> Result<Response<pb::SendCommandResponse>, Status> {
        let req = request.into_inner();
        require_client_id(&req.client_id)?;
        let envelope = decode_command(req.command)?;

        let delivered = self.state.service.send(&req.client_id, envelope).await;
        Ok(Response::new(pb::SendCommandResponse { delivered }))
    }

    /// Lists the peers currently attached to this gateway.
    async fn list_peers(
        &self,
        _request: Request<pb::ListPeersRequest>,
    ) -> Result<Response<pb::ListPeersResponse>, Status> {
        let peers = self
            .state
            .service
            .peers()
            .into_iter()
            .map(pb::PeerSummary::from)
            .collect();
        Ok(Response::new(pb::ListPeersResponse { peers }))
    }
}
