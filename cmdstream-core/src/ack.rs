use crate::{command::CommandId, error::CommandError};
use std::fmt;

/// The error codes reserved for failures detected by the command plumbing itself.
///
/// Any other code found in a [`CommandAck`] was chosen by the peer and is opaque here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ClientNotConnected,
    CommandTimeout,
    CommandFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ClientNotConnected => "CLIENT_NOT_CONNECTED",
            ErrorCode::CommandTimeout => "COMMAND_TIMEOUT",
            ErrorCode::CommandFailed => "COMMAND_FAILED",
        }
    }

    /// Returns `None` for codes that are not reserved.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "CLIENT_NOT_CONNECTED" => Some(ErrorCode::ClientNotConnected),
            "COMMAND_TIMEOUT" => Some(ErrorCode::CommandTimeout),
            "COMMAND_FAILED" => Some(ErrorCode::CommandFailed),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A peer's answer to one command.
///
/// `success == false` is a normal outcome (the peer refused or could not apply the
/// command) and is handed to the caller as-is rather than turned into an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAck {
    pub command_id: CommandId,
    pub success: bool,
    pub message: String,
    /// Machine-readable classification, `None` on success.
    pub error: Option<String>,
}

impl CommandAck {
    pub fn ok(command_id: impl Into<CommandId>, message: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            success: true,
            message: message.into(),
            error: None,
        }
    }

    pub fn rejected(
        command_id: impl Into<CommandId>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            success: false,
            message: message.into(),
            error: Some(code.into()),
        }
    }

    /// Encodes a local dispatch failure as an ack carrying the matching reserved code.
    pub fn from_error(command_id: CommandId, err: &CommandError) -> Self {
        Self::rejected(command_id, err.code().as_str(), err.to_string())
    }

    /// The reserved code carried by this ack, if any.
    pub fn reserved_code(&self) -> Option<ErrorCode> {
        self.error.as_deref().and_then(ErrorCode::parse)
    }
}
