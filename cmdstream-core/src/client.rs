//! # Streaming Command Client
//!
//! [`StreamingCommandClient`] is the per-peer façade callers use to command a peer.
//! Its [`Route`] is fixed when the client is built:
//!
//! - **Same process**: the peer's stream lives in this process's
//!   [`StreamingService`]; commands are queued on it directly and acks are correlated
//!   through the local registry.
//! - **Cross process**: the stream lives elsewhere; commands travel through a
//!   [`CommandRelay`] (the gateway's synchronous RPC bridge) and the remote process
//!   performs the same-process path on our behalf.
//!
//! Both routes return the same `CommandAck`-or-[`CommandError`] contract. A peer that
//! moves to another process needs a new client.

use crate::{
    ack::CommandAck,
    command::{Command, CommandBuilder, CommandEnvelope, Pause, Ping, RequestStatus, Resume, Resync},
    error::CommandError,
    service::StreamingService,
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

/// A trait abstracting over the transport used to reach a peer hosted by another process.
///
/// This allows the client to be used with the gRPC bridge in production and with an
/// in-memory fake in tests.
#[async_trait]
pub trait CommandRelay: Send + Sync {
    /// Queues `envelope` for `client_id` on the process at `address` without waiting.
    async fn relay_send(
        &self,
        address: &str,
        client_id: &str,
        envelope: CommandEnvelope,
    ) -> Result<bool, CommandError>;

    /// Has the process at `address` deliver `envelope` and wait up to `timeout` for the ack.
    async fn relay_send_and_wait(
        &self,
        address: &str,
        client_id: &str,
        envelope: CommandEnvelope,
        timeout: Duration,
    ) -> Result<CommandAck, CommandError>;
}

/// Where a client's peer lives, as decided at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    SameProcess,
    CrossProcess { address: String },
}

#[derive(Clone)]
enum Transport {
    Local(StreamingService),
    Remote {
        address: String,
        relay: Arc<dyn CommandRelay>,
    },
}

/// A client for commanding one peer.
#[derive(Clone)]
pub struct StreamingCommandClient {
    client_id: String,
    transport: Transport,
}

impl std::fmt::Debug for StreamingCommandClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingCommandClient")
            .field("client_id", &self.client_id)
            .field("route", &self.route())
            .finish()
    }
}

impl StreamingCommandClient {
    /// Creates a client for a peer whose stream is hosted by `service`.
    pub fn same_process(client_id: impl Into<String>, service: StreamingService) -> Self {
        Self {
            client_id: client_id.into(),
            transport: Transport::Local(service),
        }
    }

    /// Creates a client for a peer whose stream is hosted by the process at `address`.
    pub fn cross_process(
        client_id: impl Into<String>,
        address: impl Into<String>,
        relay: Arc<dyn CommandRelay>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            transport: Transport::Remote {
                address: address.into(),
                relay,
            },
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn route(&self) -> Route {
        match &self.transport {
            Transport::Local(_) => Route::SameProcess,
            Transport::Remote { address, .. } => Route::CrossProcess {
                address: address.clone(),
            },
        }
    }

    /// Fire-and-forget. Returns `false` if the peer could not be reached; nobody is
    /// waiting, so that is not an error.
    pub async fn send(&self, envelope: CommandEnvelope) -> bool {
        match &self.transport {
            Transport::Local(service) => service.send(&self.client_id, envelope).await,
            Transport::Remote { address, relay } => {
                match relay.relay_send(address, &self.client_id, envelope).await {
                    Ok(delivered) => delivered,
                    Err(e) => {
                        tracing::warn!(
                            client_id = %self.client_id,
                            address = %address,
                            error = %e,
                            "Failed to relay fire-and-forget command."
                        );
                        false
                    }
                }
            }
        }
    }

    /// Sends `envelope` and waits up to `timeout` for the peer's ack.
    ///
    /// # Errors
    ///
    /// * [`CommandError::ClientNotConnected`] immediately if the peer has no live stream.
    /// * [`CommandError::Timeout`] if no ack arrives in time.
    /// * Any other variant for transport or RPC failures.
    ///
    /// A peer that refuses the command answers with `success == false`; that ack is
    /// returned normally.
    pub async fn send_and_wait(
        &self,
        envelope: CommandEnvelope,
        timeout: Duration,
    ) -> Result<CommandAck, CommandError> {
        match &self.transport {
            Transport::Local(service) => {
                service
                    .send_and_wait(&self.client_id, envelope, timeout)
                    .await
            }
            Transport::Remote { address, relay } => {
                relay
                    .relay_send_and_wait(address, &self.client_id, envelope, timeout)
                    .await
            }
        }
    }

    /// Wraps `command` in a fresh envelope and sends it without waiting.
    pub async fn dispatch(&self, command: impl Command) -> bool {
        self.send(CommandBuilder::create().with_payload(command))
            .await
    }

    /// Wraps `command` in a fresh envelope, sends it, and waits for the ack.
    pub async fn dispatch_and_wait(
        &self,
        command: impl Command,
        timeout: Duration,
    ) -> Result<CommandAck, CommandError> {
        self.send_and_wait(CommandBuilder::create().with_payload(command), timeout)
            .await
    }

    pub async fn pause(&self, timeout: Duration) -> Result<CommandAck, CommandError> {
        self.dispatch_and_wait(Pause, timeout).await
    }

    pub async fn resume(&self, timeout: Duration) -> Result<CommandAck, CommandError> {
        self.dispatch_and_wait(Resume, timeout).await
    }

    pub async fn ping(&self, nonce: u64, timeout: Duration) -> Result<CommandAck, CommandError> {
        self.dispatch_and_wait(Ping { nonce }, timeout).await
    }

    pub async fn resync(
        &self,
        scope: Option<String>,
        timeout: Duration,
    ) -> Result<CommandAck, CommandError> {
        self.dispatch_and_wait(Resync { scope }, timeout).await
    }

    pub async fn request_status(&self, timeout: Duration) -> Result<CommandAck, CommandError> {
        self.dispatch_and_wait(RequestStatus, timeout).await
    }
}
