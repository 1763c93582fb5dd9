//! # Response Registry
//!
//! The `ResponseRegistry` correlates acknowledgments arriving on a peer's inbound
//! stream with the callers waiting for them.
//!
//! ## Exactly-once delivery
//! Both the fulfilling side (the stream reader) and the waiting side (a caller that
//! gave up on timeout) remove entries with the same atomic take-if-present
//! (`DashMap::remove`). Whichever gets there first owns the entry; the other finds
//! nothing and does nothing. An ack that loses the race is dropped and logged at
//! debug level, never raised.
//!
//! Map locks are only held for the duration of a single map operation, never across
//! an `.await`.
//!
//! ## Stale entries
//! Every entry records the deadline its waiter was given. [`ResponseRegistry::sweep_stale`]
//! only removes entries that are past that deadline by more than a grace period, so a
//! waiter still inside its timeout is never cut short.

use crate::{ack::CommandAck, command::CommandId, error::CommandError};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;

/// A single-assignment completion slot waiting for one ack.
#[derive(Debug)]
struct PendingCompletion {
    client_id: String,
    responder: oneshot::Sender<CommandAck>,
    created_at: DateTime<Utc>,
    /// `None` when the timeout is too large to represent; such entries are never swept.
    expires_at: Option<DateTime<Utc>>,
}

/// A process-local, clonable map from command id to pending completion.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct ResponseRegistry {
    pending: Arc<DashMap<CommandId, PendingCompletion>>,
}

impl ResponseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pending completion for `command_id`, owned by `client_id`, whose
    /// waiter gives up after `timeout`.
    ///
    /// Fails if an entry for the same id already exists.
    pub fn register(
        &self,
        command_id: CommandId,
        client_id: &str,
        timeout: Duration,
    ) -> Result<PendingAck, CommandError> {
        match self.pending.entry(command_id.clone()) {
            Entry::Occupied(_) => Err(CommandError::DuplicateCommand(command_id)),
            Entry::Vacant(slot) => {
                let (responder, receiver) = oneshot::channel();
                let created_at = Utc::now();
                let expires_at = chrono::Duration::from_std(timeout)
                    .ok()
                    .and_then(|timeout| created_at.checked_add_signed(timeout));
                slot.insert(PendingCompletion {
                    client_id: client_id.to_string(),
                    responder,
                    created_at,
                    expires_at,
                });
                tracing::trace!(command_id = %command_id, client_id, "Registered pending completion");
                Ok(PendingAck {
                    command_id,
                    receiver,
                    registry: self.clone(),
                })
            }
        }
    }

    /// Resolves the waiter for `ack.command_id` and removes its entry.
    ///
    /// Returns `false` when nobody was waiting: the waiter already timed out, the id
    /// is unknown, or this is a duplicate ack. None of those are errors.
    pub fn fulfill(&self, ack: CommandAck) -> bool {
        let Some((command_id, pending)) = self.pending.remove(&ack.command_id) else {
            tracing::debug!(
                command_id = %ack.command_id,
                "Dropping ack with no pending waiter (late, duplicate or unknown)."
            );
            return false;
        };

        if pending.responder.send(ack).is_err() {
            tracing::debug!(command_id = %command_id, "Waiter went away before its ack arrived.");
            return false;
        }
        true
    }

    /// Removes the entry for `command_id` so a late ack cannot resolve it.
    ///
    /// Returns `false` if the entry was already gone, which is not an error.
    pub fn reclaim(&self, command_id: &CommandId) -> bool {
        self.pending.remove(command_id).is_some()
    }

    /// Drops every pending completion owned by `client_id`.
    ///
    /// Their waiters observe a closed channel and can fail without waiting for their
    /// timeouts. Returns the number of entries dropped.
    pub fn abandon_peer(&self, client_id: &str) -> usize {
        let mut abandoned = 0;
        self.pending.retain(|_, pending| {
            let keep = pending.client_id != client_id;
            if !keep {
                abandoned += 1;
            }
            keep
        });
        abandoned
    }

    /// Removes entries whose deadline passed more than `grace` ago and returns how many.
    ///
    /// A live waiter reclaims its own entry when it times out, so anything found here
    /// was leaked by a waiter that never ran to completion.
    pub fn sweep_stale(&self, grace: Duration) -> usize {
        let Ok(grace) = chrono::Duration::from_std(grace) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(grace) else {
            return 0;
        };
        let mut swept = 0;
        self.pending.retain(|command_id, pending| {
            let keep = pending.expires_at.map_or(true, |expires_at| expires_at >= cutoff);
            if !keep {
                tracing::warn!(
                    command_id = %command_id,
                    client_id = %pending.client_id,
                    created_at = %pending.created_at,
                    "Sweeping stale pending completion."
                );
                swept += 1;
            }
            keep
        });
        swept
    }

    pub fn contains(&self, command_id: &CommandId) -> bool {
        self.pending.contains_key(command_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// The waiting side of a registered command.
///
/// Dropping a `PendingAck` reclaims its registry entry, so a caller that stops
/// waiting for any reason (timeout, task cancellation) never leaves an entry behind.
#[derive(Debug)]
pub struct PendingAck {
    command_id: CommandId,
    receiver: oneshot::Receiver<CommandAck>,
    registry: ResponseRegistry,
}

impl PendingAck {
    pub fn command_id(&self) -> &CommandId {
        &self.command_id
    }

    /// Waits for the ack. Returns `None` if the entry was removed without an ack,
    /// e.g. because the owning peer detached.
    pub async fn recv(&mut self) -> Option<CommandAck> {
        (&mut self.receiver).await.ok()
    }

    /// Removes this command's registry entry. Safe to call after it was fulfilled.
    pub fn reclaim(&self) -> bool {
        self.registry.reclaim(&self.command_id)
    }
}

impl Drop for PendingAck {
    fn drop(&mut self) {
        if self.registry.reclaim(&self.command_id) {
            tracing::debug!(command_id = %self.command_id, "Reclaimed pending completion on drop.");
        }
    }
}
