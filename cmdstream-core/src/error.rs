use crate::{ack::ErrorCode, command::CommandId};
use std::time::Duration;
use thiserror::Error;

/// Every way a command dispatch can fail.
///
/// Same-process and cross-process dispatch report the same variant for the same
/// logical failure, so callers never need to know which path ran.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Client '{client_id}' is not connected")]
    ClientNotConnected { client_id: String },

    #[error("Command {command_id} timed out after {timeout:?}")]
    Timeout {
        command_id: CommandId,
        timeout: Duration,
    },

    #[error("Command {0} is already pending")]
    DuplicateCommand(CommandId),

    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Command RPC failed: {0}")]
    Rpc(String),

    #[error("Remote dispatch failed: {0}")]
    Remote(String),

    #[error("Invalid command frame: {0}")]
    InvalidFrame(String),
}

impl CommandError {
    /// The wire code used when this error has to travel inside an ack.
    pub fn code(&self) -> ErrorCode {
        match self {
            CommandError::ClientNotConnected { .. } => ErrorCode::ClientNotConnected,
            CommandError::Timeout { .. } => ErrorCode::CommandTimeout,
            _ => ErrorCode::CommandFailed,
        }
    }

    pub fn not_connected(client_id: &str) -> Self {
        CommandError::ClientNotConnected {
            client_id: client_id.to_string(),
        }
    }
}
