//! Command dispatch and acknowledgment correlation for remote streaming peers.
//!
//! A peer holds a long-lived stream to one process. Commands addressed to it are
//! either pushed onto that stream directly (same process) or relayed through a
//! synchronous RPC to the process that holds the stream (cross process). Either
//! way the caller gets back the peer's [`CommandAck`] or a typed [`CommandError`].
//!
//! # Key Components
//!
//! *   [`command`]: The [`CommandEnvelope`] sum type, its builder and the [`Command`] trait.
//! *   [`registry::ResponseRegistry`]: Process-local map of command ids to pending waiters.
//! *   [`service::StreamingService`]: Owns the live peer streams and the registry of
//!     the process that hosts them.
//! *   [`client::StreamingCommandClient`]: Per-peer façade with `send` / `send_and_wait`.
//! *   [`router::PeerRouter`]: Decides, once per client, whether a peer is local or remote.
pub mod ack;
pub mod client;
pub mod command;
/// Defines configuration structures for the core.
pub mod config;
pub mod error;
pub mod registry;
pub mod router;
pub mod service;

pub use ack::{CommandAck, ErrorCode};
pub use client::{CommandRelay, Route, StreamingCommandClient};
pub use command::{Command, CommandBuilder, CommandEnvelope, CommandId, CommandPayload};
pub use error::CommandError;
pub use router::{PeerDirectory, PeerRouter, StaticPeerDirectory};
pub use service::{PeerConnection, PeerInfo, StreamingService};
