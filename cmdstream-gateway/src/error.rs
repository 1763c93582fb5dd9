use cmdstream_core::CommandError;
use thiserror::Error;
use tonic::Status;

/// Defines the primary error types for the gRPC gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Allows automatic conversion from our custom `GatewayError` into a `tonic::Status`.
impl From<GatewayError> for Status {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidArgument(reason) => Status::invalid_argument(reason),
            // Dispatch failures travel inside the ack; only request decoding gets here.
            GatewayError::Command(CommandError::InvalidFrame(reason)) => {
                Status::invalid_argument(reason)
            }
            GatewayError::Command(other) => Status::internal(other.to_string()),
        }
    }
}
