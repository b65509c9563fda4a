use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use nimbus_client::NodeClient;
use nimbus_wire::{MessageId, Reply, Request};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const ACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Periodic rejoin beacon (spec §4.9): announces this node to every peer so
/// they replay any segments they are holding on its behalf. Runs for the
/// lifetime of the process; peers that do not acknowledge are simply retried
/// next cycle, since the actual replay is peer-driven and idempotent to ask
/// for twice.
pub struct HandoffRequestor {
    node_id: u32,
    node_name: String,
    client_tag: String,
    client_address: String,
    peers: Vec<Arc<NodeClient>>,
    cadence: Duration,
}

impl HandoffRequestor {
    pub fn new(
        node_id: u32,
        node_name: String,
        client_tag: String,
        client_address: String,
        peers: Vec<Arc<NodeClient>>,
        cadence: Duration,
    ) -> Self {
        Self {
            node_id,
            node_name,
            client_tag,
            client_address,
            peers,
            cadence,
        }
    }

    /// Runs cycles at `cadence` until `halt` is cancelled. A cancellation
    /// observed mid-cycle drops any sends still in flight rather than
    /// waiting out their 60s deadline; the per-peer `NodeClient` sockets
    /// themselves are owned by the cluster registry and outlive this task.
    pub async fn run(&self, halt: CancellationToken) {
        let mut interval = tokio::time::interval(self.cadence);
        loop {
            tokio::select! {
                _ = halt.cancelled() => {
                    info!(node_name = %self.node_name, "handoff requestor halted");
                    return;
                }
                _ = interval.tick() => {
                    self.run_one_cycle(&halt).await;
                }
            }
        }
    }

    async fn run_one_cycle(&self, halt: &CancellationToken) {
        let request_timestamp = unix_now();
        let sends = self.peers.iter().map(|peer| {
            let peer = peer.clone();
            let request = Request::RequestHandoffs {
                message_id: MessageId::generate(),
                node_id: self.node_id,
                node_name: self.node_name.clone(),
                client_tag: self.client_tag.clone(),
                client_address: self.client_address.clone(),
                request_timestamp,
            };
            async move {
                tokio::select! {
                    _ = halt.cancelled() => {}
                    result = peer.send(request, Bytes::new(), ACK_TIMEOUT) => {
                        match result {
                            Ok((Reply::HandoffAccepted { accepted: true, .. }, _)) => {
                                info!(peer = peer.node_name(), "peer accepted handoff beacon");
                            }
                            Ok(_) => {
                                warn!(peer = peer.node_name(), "peer has not acknowledged handoff beacon");
                            }
                            Err(e) => {
                                warn!(peer = peer.node_name(), error = %e, "peer has not acknowledged handoff beacon");
                            }
                        }
                    }
                }
            }
        });
        futures::future::join_all(sends).await;
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}
