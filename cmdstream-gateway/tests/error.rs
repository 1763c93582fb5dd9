use cmdstream_core::CommandError;
use cmdstream_gateway::error::GatewayError;
use tonic::{Code, Status};

#[test]
fn malformed_requests_map_to_invalid_argument() {
    let status = Status::from(GatewayError::InvalidArgument("client_id is required".to_string()));
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "client_id is required");

    let status = Status::from(GatewayError::from(CommandError::InvalidFrame(
        "command c1 carries no payload".to_string(),
    )));
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "command c1 carries no payload");
}

#[test]
fn other_command_errors_map_to_internal() {
    let status = Status::from(GatewayError::from(CommandError::Transport(
        "peer queue is full".to_string(),
    )));
    assert_eq!(status.code(), Code::Internal);
}
