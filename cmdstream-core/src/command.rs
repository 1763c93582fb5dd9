//! # Command Envelopes
//!
//! A [`CommandEnvelope`] is the unit of dispatch: a unique [`CommandId`] plus exactly
//! one [`CommandPayload`] variant. Envelopes are created through [`CommandBuilder`],
//! which assigns the id first and only yields an envelope once a payload is attached,
//! so an envelope with no payload (or with several) cannot be constructed.
//!
//! Each concrete command also exists as its own type implementing [`Command`], which
//! lets call sites write `client.dispatch(Pause)` instead of spelling out the enum.

use std::fmt;
use uuid::Uuid;

/// Opaque identifier correlating a command with its acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(String);

impl CommandId {
    /// Generates a fresh random (v4 UUID) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CommandId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CommandId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The closed set of commands a peer understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPayload {
    Pause,
    Resume,
    Ping { nonce: u64 },
    /// Ask the peer to re-synchronise its state, optionally limited to one scope.
    Resync { scope: Option<String> },
    RequestStatus,
}

impl CommandPayload {
    /// A short, stable name used in logs and on the command line.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandPayload::Pause => "pause",
            CommandPayload::Resume => "resume",
            CommandPayload::Ping { .. } => "ping",
            CommandPayload::Resync { .. } => "resync",
            CommandPayload::RequestStatus => "request_status",
        }
    }
}

/// An immutable, addressed command ready to be written to a peer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    command_id: CommandId,
    payload: CommandPayload,
}

impl CommandEnvelope {
    pub fn command_id(&self) -> &CommandId {
        &self.command_id
    }

    pub fn payload(&self) -> &CommandPayload {
        &self.payload
    }

    pub fn into_parts(self) -> (CommandId, CommandPayload) {
        (self.command_id, self.payload)
    }
}

/// Entry point for building envelopes.
pub struct CommandBuilder;

impl CommandBuilder {
    /// Starts an envelope with a freshly generated id and no payload yet.
    pub fn create() -> PendingEnvelope {
        PendingEnvelope {
            command_id: CommandId::generate(),
        }
    }

    /// Starts an envelope with a caller-chosen id.
    ///
    /// Used for envelopes decoded from the wire and for deterministic tests. The
    /// caller is responsible for the id being unique among pending commands.
    pub fn with_id(command_id: impl Into<CommandId>) -> PendingEnvelope {
        PendingEnvelope {
            command_id: command_id.into(),
        }
    }
}

/// An envelope whose id is fixed but whose payload has not been chosen.
#[derive(Debug)]
pub struct PendingEnvelope {
    command_id: CommandId,
}

impl PendingEnvelope {
    pub fn command_id(&self) -> &CommandId {
        &self.command_id
    }

    /// Attaches the single payload variant and finishes the envelope.
    pub fn with_payload(self, command: impl Command) -> CommandEnvelope {
        CommandEnvelope {
            command_id: self.command_id,
            payload: command.into_payload(),
        }
    }
}

/// A concrete command that can be placed into an envelope.
pub trait Command {
    fn into_payload(self) -> CommandPayload;
}

impl Command for CommandPayload {
    fn into_payload(self) -> CommandPayload {
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pause;

#[derive(Debug, Clone, Copy, Default)]
pub struct Resume;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ping {
    pub nonce: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Resync {
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestStatus;

impl Command for Pause {
    fn into_payload(self) -> CommandPayload {
        CommandPayload::Pause
    }
}

impl Command for Resume {
    fn into_payload(self) -> CommandPayload {
        CommandPayload::Resume
    }
}

impl Command for Ping {
    fn into_payload(self) -> CommandPayload {
        CommandPayload::Ping { nonce: self.nonce }
    }
}

impl Command for Resync {
    fn into_payload(self) -> CommandPayload {
        CommandPayload::Resync { scope: self.scope }
    }
}

impl Command for RequestStatus {
    fn into_payload(self) -> CommandPayload {
        CommandPayload::RequestStatus
    }
}
