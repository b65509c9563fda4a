use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use nimbus_wire::UnifiedId;

use crate::error::NodeClientError;

#[derive(Debug, thiserror::Error)]
pub enum WriteAdapterError {
    #[error(transparent)]
    Node(#[from] NodeClientError),
    #[error("archive {0} already in progress on this writer")]
    AlreadyBusy(UnifiedId),
    #[error("no archive in progress on this writer")]
    NotBusy,
    #[error("handoff to backup nodes failed: {0}")]
    HandoffFailed(#[source] NodeClientError),
}

pub struct StartArchive {
    pub unified_id: UnifiedId,
    pub collection_id: u32,
    pub key: String,
    pub timestamp: i64,
    pub segment_num: u32,
    pub meta: BTreeMap<String, String>,
}

pub struct ArchiveSlice {
    pub unified_id: UnifiedId,
    pub segment_num: u32,
    pub slice_index: u32,
    pub adler32: u32,
    pub md5: String,
    pub payload: Bytes,
}

pub struct ArchiveFinal {
    pub unified_id: UnifiedId,
    pub segment_num: u32,
    pub slice_index: u32,
    pub total_size: u64,
    pub file_adler32: u32,
    pub file_md5: String,
    pub adler32: u32,
    pub md5: String,
    pub payload: Bytes,
}

pub struct Destroy {
    pub unified_id: UnifiedId,
    pub collection_id: u32,
    pub key: String,
    pub timestamp: i64,
}

/// Common shape of "one segment's worth of writes, to one node" whether that
/// node is the object's actual primary ([`crate::DataWriter`]) or a backup
/// standing in for an unreachable primary ([`crate::HandoffClient`]), per
/// spec §4.4–§4.5. The [`crate::Archiver`](../nimbus_gateway) drives one of
/// these per segment without needing to know which kind it has.
#[async_trait]
pub trait WriteAdapter: Send + Sync {
    async fn start_archive(&self, req: StartArchive) -> Result<(), WriteAdapterError>;
    async fn archive_slice(&self, req: ArchiveSlice) -> Result<(), WriteAdapterError>;
    async fn archive_final(&self, req: ArchiveFinal) -> Result<(), WriteAdapterError>;
    /// Returns the size the node reports having removed, if it reports one.
    async fn destroy(&self, req: Destroy) -> Result<Option<u64>, WriteAdapterError>;
    /// Best-effort notice that an in-flight archive should be abandoned.
    /// Errors are logged, not surfaced: cancellation happens on the
    /// already-failing path and must not itself fail the caller.
    async fn cancel(&self, unified_id: UnifiedId);
    /// The node actually being written to, for logging and accounting.
    fn node_name(&self) -> &str;
}
