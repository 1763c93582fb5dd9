//! # Synchronous RPC Bridge
//!
//! [`SyncRpcBridge`] is the cross-process half of command dispatch. When a peer's
//! stream lives in another gateway, the caller's gateway issues `ExecuteCommandSync`
//! to it; the remote gateway runs the ordinary same-process dispatch against its own
//! registry and answers with the ack.
//!
//! The server enforces the caller's timeout. The client-side RPC deadline is only a
//! safety net and is always set well beyond it (see [`rpc_deadline`]), otherwise the
//! transport could cancel the call just before the server reports the real outcome.

use crate::{
    config::BridgeConfig,
    grpc::proto::cmdstream::v1::{
        self as pb, command_stream_service_client::CommandStreamServiceClient,
    },
};
use async_trait::async_trait;
use cmdstream_core::{CommandAck, CommandEnvelope, CommandError, CommandRelay, ErrorCode};
use dashmap::DashMap;
use std::time::Duration;
use tonic::{
    transport::{Channel, Endpoint},
    Request,
};

/// The client-side deadline multiplier applied to the requested command timeout.
pub const RPC_TIMEOUT_MULTIPLIER: u32 = 3;

/// Computes the client-side deadline for an `ExecuteCommandSync` call.
///
/// The result is `max(3 × timeout, floor)` and never less than one second more than
/// `timeout`.
pub fn rpc_deadline(timeout: Duration, floor: Duration) -> Duration {
    timeout
        .saturating_mul(RPC_TIMEOUT_MULTIPLIER)
        .max(floor)
        .max(timeout.saturating_add(Duration::from_secs(1)))
}

/// Converts a command timeout to the `timeout_ms` field of `ExecuteCommandSync`.
///
/// Rounds up and never yields `0`, which the server reads as "use the default".
pub fn wire_timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos().div_ceil(1_000_000))
        .unwrap_or(u64::MAX)
        .max(1)
}

/// Maps an ack returned by a remote gateway back onto the local error taxonomy.
///
/// Reserved codes mean the remote gateway itself failed to deliver the command and
/// become the same [`CommandError`] variants the same-process path raises. Acks
/// without a reserved code came from the peer and are returned as they are.
pub fn classify_remote_ack(
    ack: CommandAck,
    client_id: &str,
    timeout: Duration,
) -> Result<CommandAck, CommandError> {
    if ack.success {
        return Ok(ack);
    }
    match ack.reserved_code() {
        Some(ErrorCode::ClientNotConnected) => Err(CommandError::not_connected(client_id)),
        Some(ErrorCode::CommandTimeout) => Err(CommandError::Timeout {
            command_id: ack.command_id,
            timeout,
        }),
        Some(ErrorCode::CommandFailed) => Err(CommandError::Remote(ack.message)),
        None => Ok(ack),
    }
}

/// A [`CommandRelay`] that reaches other gateways over gRPC.
///
/// Channels are opened lazily and cached per address, so concurrent callers share
/// one HTTP/2 connection per remote gateway.
#[derive(Debug, Default)]
pub struct SyncRpcBridge {
    channels: DashMap<String, Channel>,
    config: BridgeConfig,
}

impl SyncRpcBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            channels: DashMap::new(),
            config,
        }
    }

    /// The client-side deadline used for a command with the given `timeout`.
    pub fn deadline_for(&self, timeout: Duration) -> Duration {
        rpc_deadline(
            timeout,
            Duration::from_secs(self.config.rpc_timeout_floor_secs),
        )
    }

    fn client_for(&self, address: &str) -> Result<CommandStreamServiceClient<Channel>, CommandError> {
        if let Some(channel) = self.channels.get(address) {
            return Ok(CommandStreamServiceClient::new(channel.clone()));
        }

        let channel = Endpoint::from_shared(address.to_string())
            .map_err(|e| CommandError::Rpc(format!("invalid gateway address '{address}': {e}")))?
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .connect_lazy();
        let channel = self
            .channels
            .entry(address.to_string())
            .or_insert(channel)
            .clone();
        Ok(CommandStreamServiceClient::new(channel))
    }
}

#[async_trait]
impl CommandRelay for SyncRpcBridge {
    async fn relay_send(
        &self,
        address: &str,
        client_id: &str,
        envelope: CommandEnvelope,
    ) -> Result<bool, CommandError> {
        let mut client = self.client_for(address)?;
        let request = pb::SendCommandRequest {
            client_id: client_id.to_string(),
            command: Some(envelope.into()),
        };

        let response = client
            .send_command(request)
            .await
            .map_err(|status| CommandError::Rpc(status.message().to_string()))?;
        Ok(response.into_inner().delivered)
    }

    async fn relay_send_and_wait(
        &self,
        address: &str,
        client_id: &str,
        envelope: CommandEnvelope,
        timeout: Duration,
    ) -> Result<CommandAck, CommandError> {
        let mut client = self.client_for(address)?;
        let command_id = envelope.command_id().clone();

        let mut request = Request::new(pb::ExecuteCommandRequest {
            client_id: client_id.to_string(),
            command: Some(envelope.into()),
            timeout_ms: wire_timeout_ms(timeout),
        });
        request.set_timeout(self.deadline_for(timeout));

        tracing::debug!(
            client_id,
            address,
            command_id = %command_id,
            ?timeout,
            "Relaying command through ExecuteCommandSync."
        );
        let ack = client
            .execute_command_sync(request)
            .await
            .map_err(|status| {
                CommandError::Rpc(format!(
                    "ExecuteCommandSync to {address} failed: {}",
                    status.message()
                ))
            })?
            .into_inner();

        classify_remote_ack(CommandAck::from(ack), client_id, timeout)
    }
}
