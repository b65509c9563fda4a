//! The receive side of a handoff: storing segments tagged for an
//! unreachable primary and replaying them once that primary rejoins (spec
//! §10 "Supplemented features"). The gateway never runs this role itself —
//! it is a storage-node responsibility — but the contract is specified here
//! so `HandoffClient`/`HandoffRequestor` tests have something real to drive
//! against.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use nimbus_wire::Request;

#[derive(Debug, Clone)]
pub struct HandoffRecord {
    pub request: Request,
    pub payload: Bytes,
}

#[async_trait]
pub trait HandoffServer: Send + Sync {
    /// Persist a segment received on behalf of `dest_node_name`.
    async fn store(&self, dest_node_name: &str, record: HandoffRecord);

    /// Hand back every record stored for `dest_node_name` and forget them,
    /// in the order they were stored. Called once that node's
    /// `request-handoffs` beacon arrives.
    async fn drain(&self, dest_node_name: &str) -> Vec<HandoffRecord>;
}

#[derive(Default)]
pub struct InMemoryHandoffServer {
    by_dest: Mutex<HashMap<String, Vec<HandoffRecord>>>,
}

impl InMemoryHandoffServer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HandoffServer for InMemoryHandoffServer {
    async fn store(&self, dest_node_name: &str, record: HandoffRecord) {
        self.by_dest
            .lock()
            .expect("handoff server mutex poisoned")
            .entry(dest_node_name.to_string())
            .or_default()
            .push(record);
    }

    async fn drain(&self, dest_node_name: &str) -> Vec<HandoffRecord> {
        self.by_dest
            .lock()
            .expect("handoff server mutex poisoned")
            .remove(dest_node_name)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_wire::{MessageId, UnifiedId};

    fn record(unified_id: u64) -> HandoffRecord {
        HandoffRecord {
            request: Request::ArchiveKeyCancel {
                message_id: MessageId::generate(),
                unified_id: UnifiedId(unified_id),
                dest_node_name: Some("node-3".to_string()),
            },
            payload: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn drain_returns_records_in_store_order_and_forgets_them() {
        let server = InMemoryHandoffServer::new();
        server.store("node-3", record(1)).await;
        server.store("node-3", record(2)).await;

        let drained = server.drain("node-3").await;
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0].request, Request::ArchiveKeyCancel { unified_id: UnifiedId(1), .. }));
        assert!(matches!(drained[1].request, Request::ArchiveKeyCancel { unified_id: UnifiedId(2), .. }));

        assert!(server.drain("node-3").await.is_empty());
    }

    #[tokio::test]
    async fn drain_for_unknown_dest_is_empty() {
        let server = InMemoryHandoffServer::new();
        assert!(server.drain("node-9").await.is_empty());
    }
}
