use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use nimbus_wire::{MessageId, Reply, Request, UnifiedId};
use tokio::sync::Mutex;
use tracing::warn;

use crate::node_client::NodeClient;
use crate::write_adapter::{ArchiveFinal, ArchiveSlice, Destroy, StartArchive, WriteAdapter, WriteAdapterError};

/// Writes one segment directly to its primary node.
///
/// Enforces that only one archive is in flight through a given `DataWriter`
/// at a time (spec §4.4): `start_archive` claims the writer for its
/// `unified_id` and `archive_final`/`cancel` release it. A second
/// `start_archive` before that happens is rejected rather than silently
/// interleaved with the first.
pub struct DataWriter {
    client: Arc<NodeClient>,
    reply_timeout: Duration,
    in_flight: Mutex<Option<UnifiedId>>,
}

impl DataWriter {
    pub fn new(client: Arc<NodeClient>, reply_timeout: Duration) -> Self {
        Self {
            client,
            reply_timeout,
            in_flight: Mutex::new(None),
        }
    }

    async fn send_ack(&self, request: Request) -> Result<(), WriteAdapterError> {
        let (reply, _payload) = self.client.send(request, Bytes::new(), self.reply_timeout).await?;
        match reply {
            Reply::Ack { .. } => Ok(()),
            other => {
                warn!(node = %self.client.node_name(), reply = ?other, "unexpected reply shape for write request");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl WriteAdapter for DataWriter {
    async fn start_archive(&self, req: StartArchive) -> Result<(), WriteAdapterError> {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(busy) = *in_flight {
            return Err(WriteAdapterError::AlreadyBusy(busy));
        }
        *in_flight = Some(req.unified_id);
        drop(in_flight);

        let request = Request::ArchiveKeyStart {
            message_id: MessageId::generate(),
            unified_id: req.unified_id,
            collection_id: req.collection_id,
            key: req.key,
            timestamp: req.timestamp,
            segment_num: req.segment_num,
            meta: req.meta,
            dest_node_name: None,
        };
        let result = self.send_ack(request).await;
        if result.is_err() {
            *self.in_flight.lock().await = None;
        }
        result
    }

    async fn archive_slice(&self, req: ArchiveSlice) -> Result<(), WriteAdapterError> {
        {
            let in_flight = self.in_flight.lock().await;
            if *in_flight != Some(req.unified_id) {
                return Err(WriteAdapterError::NotBusy);
            }
        }

        let request = Request::ArchiveKeyNext {
            message_id: MessageId::generate(),
            unified_id: req.unified_id,
            segment_num: req.segment_num,
            slice_index: req.slice_index,
            adler32: req.adler32,
            md5: req.md5,
            dest_node_name: None,
        };
        let (reply, _payload) = self
            .client
            .send(request, req.payload, self.reply_timeout)
            .await?;
        match reply {
            Reply::Ack { .. } => Ok(()),
            other => {
                warn!(node = %self.client.node_name(), reply = ?other, "unexpected reply shape for write request");
                Ok(())
            }
        }
    }

    async fn archive_final(&self, req: ArchiveFinal) -> Result<(), WriteAdapterError> {
        {
            let in_flight = self.in_flight.lock().await;
            if *in_flight != Some(req.unified_id) {
                return Err(WriteAdapterError::NotBusy);
            }
        }

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
            dest_node_name: None,
        };
        let result = self
            .client
            .send(request, req.payload, self.reply_timeout)
            .await
            .map(|_| ())
            .map_err(WriteAdapterError::from);
        *self.in_flight.lock().await = None;
        result
    }

    async fn destroy(&self, req: Destroy) -> Result<Option<u64>, WriteAdapterError> {
        let request = Request::DestroyKey {
            message_id: MessageId::generate(),
            collection_id: req.collection_id,
            key: req.key,
            unified_id: req.unified_id,
            timestamp: req.timestamp,
            dest_node_name: None,
        };
        let (reply, _payload) = self.client.send(request, Bytes::new(), self.reply_timeout).await?;
        match reply {
            Reply::Ack { size_removed, .. } => Ok(size_removed),
            _ => Ok(None),
        }
    }

    async fn cancel(&self, unified_id: UnifiedId) {
        let mut in_flight = self.in_flight.lock().await;
        if *in_flight != Some(unified_id) {
            return;
        }
        *in_flight = None;
        drop(in_flight);

        let request = Request::ArchiveKeyCancel {
            message_id: MessageId::generate(),
            unified_id,
            dest_node_name: None,
        };
        if let Err(e) = self.client.send(request, Bytes::new(), self.reply_timeout).await {
            warn!(node = %self.client.node_name(), error = %e, "cancel notification failed");
        }
    }

    fn node_name(&self) -> &str {
        self.client.node_name()
    }
}
