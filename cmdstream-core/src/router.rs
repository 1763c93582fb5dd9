//! Peer lookup and route selection.

use crate::{
    client::{CommandRelay, StreamingCommandClient},
    service::StreamingService,
};
use std::{collections::HashMap, sync::Arc};

/// Resolves the network location of the process hosting a peer's stream.
pub trait PeerDirectory: Send + Sync {
    /// Returns the gRPC address (e.g. `http://10.0.0.5:50051`) of the process that
    /// hosts `client_id`, or `None` if unknown.
    fn grpc_address(&self, client_id: &str) -> Option<String>;
}

/// A fixed `client_id -> address` table, usually read from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticPeerDirectory {
    addresses: HashMap<String, String>,
}

impl StaticPeerDirectory {
    pub fn new(addresses: HashMap<String, String>) -> Self {
        Self { addresses }
    }

    pub fn insert(&mut self, client_id: impl Into<String>, address: impl Into<String>) {
        self.addresses.insert(client_id.into(), address.into());
    }
}

impl PeerDirectory for StaticPeerDirectory {
    fn grpc_address(&self, client_id: &str) -> Option<String> {
        self.addresses.get(client_id).cloned()
    }
}

/// Builds [`StreamingCommandClient`]s with the right route for each peer.
///
/// A peer attached to the local `service` is commanded in-process. Otherwise, if the
/// directory knows where it lives, commands are relayed there. A peer known to
/// neither gets a same-process client, which reports `ClientNotConnected` right away.
#[derive(Clone)]
pub struct PeerRouter {
    service: StreamingService,
    directory: Arc<dyn PeerDirectory>,
    relay: Arc<dyn CommandRelay>,
}

impl PeerRouter {
    pub fn new(
        service: StreamingService,
        directory: Arc<dyn PeerDirectory>,
        relay: Arc<dyn CommandRelay>,
    ) -> Self {
        Self {
            service,
            directory,
            relay,
        }
    }

    pub fn service(&self) -> &StreamingService {
        &self.service
    }

    /// Resolves the route for `client_id` once and returns a client bound to it.
    pub fn client(&self, client_id: &str) -> StreamingCommandClient {
        if self.service.is_attached(client_id) {
            return StreamingCommandClient::same_process(client_id, self.service.clone());
        }

        match self.directory.grpc_address(client_id) {
            Some(address) => {
                tracing::debug!(client_id, address = %address, "Routing peer through the RPC bridge.");
                StreamingCommandClient::cross_process(client_id, address, self.relay.clone())
            }
            None => StreamingCommandClient::same_process(client_id, self.service.clone()),
        }
    }
}
