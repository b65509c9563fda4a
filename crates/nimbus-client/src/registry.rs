use std::collections::HashMap;
use std::sync::Arc;

use nimbus_wire::Topology;

use crate::dialer::TcpDialer;
use crate::node_client::NodeClient;

/// Errors building a [`ClusterClients`] registry from configuration, as
/// opposed to errors talking to an already-built one (see
/// [`crate::NodeClientError`]).
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("no address configured for node {0}")]
    MissingAddress(String),
}

/// Process-scoped, immutable set of [`NodeClient`]s, one per cluster node
/// (spec §9's "global cluster topology" / "no cyclic ownership": components
/// borrow from this registry rather than owning sockets themselves).
pub struct ClusterClients {
    by_name: HashMap<String, Arc<NodeClient>>,
}

impl ClusterClients {
    /// Wraps an already-built set of clients, keyed by node name. Used by
    /// callers (tests, mainly) that need to hand the registry pre-dialed
    /// clients over a fake transport rather than real TCP.
    pub fn from_clients(by_name: HashMap<String, Arc<NodeClient>>) -> Self {
        Self { by_name }
    }

    /// Dials every node named in `topology` at its address in `addrs`.
    ///
    /// Fails with [`RegistryError::MissingAddress`] rather than panicking if
    /// `addrs` is missing an entry for one of `topology`'s nodes — a
    /// plausible operator typo (a node present in `NIMBUSIO_NODE_NAME_SEQ`
    /// but absent from `NIMBUSIO_NODE_ADDRESSES`) must fail boot cleanly,
    /// not crash the process.
    pub fn connect(topology: &Topology, addrs: &HashMap<String, String>) -> Result<Self, RegistryError> {
        let by_name = topology
            .nodes()
            .iter()
            .map(|name| {
                let addr = addrs.get(name).ok_or_else(|| RegistryError::MissingAddress(name.clone()))?;
                let client = NodeClient::connect(name.clone(), TcpDialer::new(addr.clone()));
                Ok((name.clone(), client))
            })
            .collect::<Result<_, RegistryError>>()?;
        Ok(Self { by_name })
    }

    pub fn get(&self, node_name: &str) -> Option<Arc<NodeClient>> {
        self.by_name.get(node_name).cloned()
    }

    /// Node names currently reporting a live socket, in no particular order.
    pub fn connected_nodes(&self) -> Vec<String> {
        self.by_name
            .iter()
            .filter(|(_, client)| client.connected())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn all(&self) -> impl Iterator<Item = (&str, &Arc<NodeClient>)> {
        self.by_name.iter().map(|(name, client)| (name.as_str(), client))
    }
}
