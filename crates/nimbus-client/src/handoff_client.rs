use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use nimbus_wire::{MessageId, Reply, Request, UnifiedId};
use tracing::warn;

use crate::node_client::NodeClient;
use crate::write_adapter::{ArchiveFinal, ArchiveSlice, Destroy, StartArchive, WriteAdapter, WriteAdapterError};

/// Drop-in replacement for a [`DataWriter`](crate::DataWriter) targeting a
/// node that was unreachable when the archive started (spec §4.5). Every
/// operation is forwarded to both backups; it only succeeds once both have
/// acknowledged. The backups are told which node they're standing in for via
/// `dest_node_name`, so the node can persist a handoff record for later
/// replay.
pub struct HandoffClient {
    dest_node_name: String,
    backups: [Arc<NodeClient>; 2],
    reply_timeout: Duration,
}

impl HandoffClient {
    pub fn new(dest_node_name: impl Into<String>, backups: [Arc<NodeClient>; 2], reply_timeout: Duration) -> Self {
        Self {
            dest_node_name: dest_node_name.into(),
            backups,
            reply_timeout,
        }
    }

    async fn send_to_both(&self, request: Request, payload: Bytes) -> Result<(Reply, Reply), WriteAdapterError> {
        let (a, b) = tokio::join!(
            self.backups[0].send(request.clone(), payload.clone(), self.reply_timeout),
            self.backups[1].send(request, payload, self.reply_timeout),
        );
        match (a, b) {
            (Ok((reply_a, _)), Ok((reply_b, _))) => Ok((reply_a, reply_b)),
            (Err(e), _) | (_, Err(e)) => Err(WriteAdapterError::HandoffFailed(e)),
        }
    }
}

#[async_trait]
impl WriteAdapter for HandoffClient {
    async fn start_archive(&self, req: StartArchive) -> Result<(), WriteAdapterError> {
        let request = Request::ArchiveKeyStart {
            message_id: MessageId::generate(),
            unified_id: req.unified_id,
            collection_id: req.collection_id,
            key: req.key,
            timestamp: req.timestamp,
            segment_num: req.segment_num,
            meta: req.meta,
            dest_node_name: Some(self.dest_node_name.clone()),
        };
        self.send_to_both(request, Bytes::new()).await?;
        Ok(())
    }

    async fn archive_slice(&self, req: ArchiveSlice) -> Result<(), WriteAdapterError> {
        let request = Request::ArchiveKeyNext {
            message_id: MessageId::generate(),
            unified_id: req.unified_id,
            segment_num: req.segment_num,
            slice_index: req.slice_index,
            adler32: req.adler32,
            md5: req.md5,
            dest_node_name: Some(self.dest_node_name.clone()),
        };
        self.send_to_both(request, req.payload).await?;
        Ok(())
    }

    async fn archive_final(&self, req: ArchiveFinal) -> Result<(), WriteAdapterError> {
        let request = Request::ArchiveKeyFinal {
            message_id: MessageId::generate(),
            unified_id: req.unified_id,
            segment_num: req.segment_num,
            slice_index: req.slice_index,
            total_size: req.total_size,
            file_adler32: req.file_adler32,
            file_md5: req.file_md5,
            adler32: req.adler32,
            md5: req.md5,
            dest_node_name: Some(self.dest_node_name.clone()),
        };
        self.send_to_both(request, req.payload).await?;
        Ok(())
    }

    async fn destroy(&self, req: Destroy) -> Result<Option<u64>, WriteAdapterError> {
        let request = Request::DestroyKey {
            message_id: MessageId::generate(),
            collection_id: req.collection_id,
            key: req.key,
            unified_id: req.unified_id,
            timestamp: req.timestamp,
            dest_node_name: Some(self.dest_node_name.clone()),
        };
        let (reply_a, _reply_b) = self.send_to_both(request, Bytes::new()).await?;
        match reply_a {
            Reply::Ack { size_removed, .. } => Ok(size_removed),
            _ => Ok(None),
        }
    }

    async fn cancel(&self, unified_id: UnifiedId) {
        let request = Request::ArchiveKeyCancel {
            message_id: MessageId::generate(),
            unified_id,
            dest_node_name: Some(self.dest_node_name.clone()),
        };
        if let Err(e) = self.send_to_both(request, Bytes::new()).await {
            warn!(dest = %self.dest_node_name, error = %e, "handoff cancel notification failed");
        }
    }

    fn node_name(&self) -> &str {
        &self.dest_node_name
    }
}
