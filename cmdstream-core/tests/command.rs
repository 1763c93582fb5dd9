use cmdstream_core::{
    ack::ErrorCode,
    command::{Pause, Ping, Resync},
    CommandAck, CommandBuilder, CommandError, CommandId, CommandPayload,
};
use std::{collections::HashSet, time::Duration};

#[test]
fn generated_command_ids_are_unique() {
    let ids: HashSet<CommandId> = (0..10_000)
        .map(|_| CommandBuilder::create().command_id().clone())
        .collect();
    assert_eq!(ids.len(), 10_000);
}

#[test]
fn builder_keeps_the_id_and_sets_exactly_one_payload() {
    let pending = CommandBuilder::with_id("c1");
    assert_eq!(pending.command_id().as_str(), "c1");

    let envelope = pending.with_payload(Resync {
        scope: Some("accounts".to_string()),
    });
    assert_eq!(envelope.command_id(), &CommandId::from("c1"));
    assert_eq!(
        envelope.payload(),
        &CommandPayload::Resync {
            scope: Some("accounts".to_string())
        }
    );
    assert_eq!(envelope.payload().kind(), "resync");
}

#[test]
fn command_types_map_to_their_payload_variant() {
    let pause = CommandBuilder::create().with_payload(Pause);
    assert_eq!(pause.payload(), &CommandPayload::Pause);

    let ping = CommandBuilder::create().with_payload(Ping { nonce: 7 });
    assert_eq!(ping.payload(), &CommandPayload::Ping { nonce: 7 });

    let raw = CommandBuilder::create().with_payload(CommandPayload::RequestStatus);
    assert_eq!(raw.payload().kind(), "request_status");
}

#[test]
fn reserved_error_codes_parse_back() {
    for code in [
        ErrorCode::ClientNotConnected,
        ErrorCode::CommandTimeout,
        ErrorCode::CommandFailed,
    ] {
        assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
    }
    assert_eq!(ErrorCode::parse("INVALID_STATE"), None);
}

#[test]
fn errors_encode_into_acks_with_their_reserved_code() {
    let timeout = CommandError::Timeout {
        command_id: CommandId::from("c9"),
        timeout: Duration::from_secs(2),
    };
    let ack = CommandAck::from_error(CommandId::from("c9"), &timeout);
    assert!(!ack.success);
    assert_eq!(ack.error.as_deref(), Some("COMMAND_TIMEOUT"));
    assert_eq!(ack.reserved_code(), Some(ErrorCode::CommandTimeout));

    let transport = CommandError::Transport("broken pipe".to_string());
    let ack = CommandAck::from_error(CommandId::from("c10"), &transport);
    assert_eq!(ack.reserved_code(), Some(ErrorCode::CommandFailed));
    assert!(ack.message.contains("broken pipe"));

    let not_connected = CommandError::not_connected("worker-1");
    assert_eq!(not_connected.code(), ErrorCode::ClientNotConnected);
}

#[test]
fn peer_defined_codes_are_not_reserved() {
    let ack = CommandAck::rejected("c2", "INVALID_STATE", "already paused");
    assert_eq!(ack.reserved_code(), None);
    assert_eq!(ack.error.as_deref(), Some("INVALID_STATE"));
}
