use std::sync::Arc;
use std::time::Duration;

use nimbus_client::{ClusterClients, DataWriter, HandoffClient, NodeClient, WriteAdapter};
use nimbus_erasure::Segmenter;
use nimbus_wire::Topology;
use rand::seq::SliceRandom;

use crate::error::GatewayError;

/// Ties the process-wide [`Topology`] and [`ClusterClients`] together with
/// the cluster's fixed erasure-coding shape, and assembles the per-request
/// writer/reader sets that [`crate::Archiver`], [`crate::Retriever`], and
/// [`crate::Destroyer`] drive (spec §9 "global cluster topology": passed by
/// value/reference into each component, never mutated).
pub struct Cluster {
    topology: Topology,
    clients: ClusterClients,
    segmenter: Segmenter,
    min_connected: usize,
    reply_timeout: Duration,
}

impl Cluster {
    pub fn new(
        topology: Topology,
        clients: ClusterClients,
        segmenter: Segmenter,
        min_connected: usize,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            topology,
            clients,
            segmenter,
            min_connected,
            reply_timeout,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    pub fn node_count(&self) -> usize {
        self.topology.node_count()
    }

    /// Direct lookup by node name, connected or not. Used by the handoff
    /// beacon, which needs every peer regardless of its current socket
    /// state (spec §4.9: a peer that is down today still gets retried next
    /// cycle).
    pub fn client(&self, node_name: &str) -> Option<Arc<NodeClient>> {
        self.clients.get(node_name)
    }

    fn connected_node_names(&self) -> Vec<String> {
        self.topology
            .nodes()
            .iter()
            .filter(|name| self.clients.get(name).map(|c| c.connected()).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// One [`WriteAdapter`] per node in topology order: a [`DataWriter`] for
    /// a connected primary, a [`HandoffClient`] targeting two distinct
    /// connected backups (drawn without replacement, never the missing
    /// primary itself) for one that is down (spec §4.6, invariants 2–3).
    ///
    /// Refuses up-front with [`GatewayError::ServiceUnavailable`] if fewer
    /// than `min_connected` primaries are currently connected.
    pub fn assemble_writers(&self) -> Result<Vec<Arc<dyn WriteAdapter>>, GatewayError> {
        let connected = self.connected_node_names();
        if connected.len() < self.min_connected {
            return Err(GatewayError::ServiceUnavailable {
                available: connected.len(),
                required: self.min_connected,
            });
        }

        let mut rng = rand::thread_rng();
        let mut writers: Vec<Arc<dyn WriteAdapter>> = Vec::with_capacity(self.node_count());
        for name in self.topology.nodes() {
            let client = self
                .clients
                .get(name)
                .unwrap_or_else(|| panic!("topology names {name} but no client was registered for it"));

            if client.connected() {
                writers.push(Arc::new(DataWriter::new(client, self.reply_timeout)));
                continue;
            }

            let mut candidates = connected.clone();
            candidates.shuffle(&mut rng);
            let mut backup_names = candidates.into_iter().take(2);
            let (Some(b1), Some(b2)) = (backup_names.next(), backup_names.next()) else {
                // Only reachable if `min_connected < 2`, which `assemble_writers`'s
                // own length check above does not rule out on its own.
                return Err(GatewayError::ServiceUnavailable {
                    available: connected.len(),
                    required: 2,
                });
            };

            let backups = [
                self.clients.get(&b1).expect("backup name came from connected_node_names"),
                self.clients.get(&b2).expect("backup name came from connected_node_names"),
            ];
            writers.push(Arc::new(HandoffClient::new(name.clone(), backups, self.reply_timeout)));
        }
        Ok(writers)
    }

    /// One `(node_name, NodeClient)` pair per currently-connected node, for
    /// the Retriever to read from directly; handoff has no read-side
    /// equivalent.
    pub fn connected_readers(&self) -> Result<Vec<(String, Arc<NodeClient>)>, GatewayError> {
        let readers: Vec<(String, Arc<NodeClient>)> = self
            .connected_node_names()
            .into_iter()
            .filter_map(|name| self.clients.get(&name).map(|client| (name, client)))
            .collect();
        if readers.len() < self.min_connected {
            return Err(GatewayError::ServiceUnavailable {
                available: readers.len(),
                required: self.min_connected,
            });
        }
        Ok(readers)
    }
}
