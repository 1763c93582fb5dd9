use crate::grpc::proto::cmdstream::v1 as pb;
use chrono::{DateTime, Utc};
use cmdstream_core::{
    CommandAck, CommandBuilder, CommandEnvelope, CommandError, CommandPayload, PeerInfo,
};

impl From<CommandEnvelope> for pb::CommandFrame {
    fn from(envelope: CommandEnvelope) -> Self {
        let (command_id, payload) = envelope.into_parts();
        let payload = match payload {
            CommandPayload::Pause => pb::command_frame::Payload::Pause(pb::Pause {}),
            CommandPayload::Resume => pb::command_frame::Payload::Resume(pb::Resume {}),
            CommandPayload::Ping { nonce } => pb::command_frame::Payload::Ping(pb::Ping { nonce }),
            CommandPayload::Resync { scope } => pb::command_frame::Payload::Resync(pb::Resync {
                scope: scope.unwrap_or_default(),
            }),
            CommandPayload::RequestStatus => {
                pb::command_frame::Payload::RequestStatus(pb::RequestStatus {})
            }
        };

        Self {
            command_id: command_id.to_string(),
            payload: Some(payload),
        }
    }
}

impl TryFrom<pb::CommandFrame> for CommandEnvelope {
    type Error = CommandError;

    fn try_from(frame: pb::CommandFrame) -> Result<Self, Self::Error> {
        if frame.command_id.is_empty() {
            return Err(CommandError::InvalidFrame("command_id is empty".to_string()));
        }

        let payload = match frame.payload {
            Some(pb::command_frame::Payload::Pause(_)) => CommandPayload::Pause,
            Some(pb::command_frame::Payload::Resume(_)) => CommandPayload::Resume,
            Some(pb::command_frame::Payload::Ping(ping)) => CommandPayload::Ping { nonce: ping.nonce },
            Some(pb::command_frame::Payload::Resync(resync)) => CommandPayload::Resync {
                scope: Some(resync.scope).filter(|scope| !scope.is_empty()),
            },
            Some(pb::command_frame::Payload::RequestStatus(_)) => CommandPayload::RequestStatus,
            None => {
                return Err(CommandError::InvalidFrame(format!(
                    "command {} carries no payload",
                    frame.command_id
                )))
            }
        };

        Ok(CommandBuilder::with_id(frame.command_id).with_payload(payload))
    }
}

impl From<CommandAck> for pb::CommandAck {
    fn from(ack: CommandAck) -> Self {
        Self {
            command_id: ack.command_id.to_string(),
            success: ack.success,
            message: ack.message,
            error: ack.error.unwrap_or_default(),
        }
    }
}

impl From<pb::CommandAck> for CommandAck {
    fn from(ack: pb::CommandAck) -> Self {
        Self {
            command_id: ack.command_id.into(),
            success: ack.success,
            message: ack.message,
            error: Some(ack.error).filter(|code| !code.is_empty()),
        }
    }
}

impl From<PeerInfo> for pb::PeerSummary {
    fn from(peer: PeerInfo) -> Self {
        Self {
            client_id: peer.client_id,
            connection_id: peer.connection_id,
            connected_at_ms: unix_millis(peer.connected_at),
            last_seen_ms: unix_millis(peer.last_seen),
        }
    }
}

fn unix_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}
