use crate::ids::{MessageId, UnifiedId};
use std::collections::BTreeMap;

/// Result code carried on every reply. `Ok` is always `0`; every error kind
/// gets its own distinct value.
///
/// The historical nimbus.io wire protocol assigned the same numeric value (`2`)
/// to both "archive too old" and "database failure" replies. This is a fresh
/// wire protocol, so the two are split out rather than preserved as an
/// ambiguity (see DESIGN.md Open Question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum ResultCode {
    Ok = 0,
    NotFound = 1,
    TooOld = 2,
    DatabaseFailure = 3,
    InvalidRequest = 4,
    Internal = 5,
}

impl ResultCode {
    pub fn is_ok(self) -> bool {
        matches!(self, ResultCode::Ok)
    }
}

/// Gateway → node requests, per spec §6's inter-node message schema. Message
/// payload bytes (slice content) travel alongside the header in a
/// [`crate::framing::Frame`] rather than being inlined here.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "archive-key-start")]
    ArchiveKeyStart {
        message_id: MessageId,
        unified_id: UnifiedId,
        collection_id: u32,
        key: String,
        timestamp: i64,
        segment_num: u32,
        meta: BTreeMap<String, String>,
        /// Set when this message is being relayed to a backup node on behalf
        /// of an unreachable primary (spec §4.5); `None` for direct delivery.
        dest_node_name: Option<String>,
    },
    #[serde(rename = "archive-key-next")]
    ArchiveKeyNext {
        message_id: MessageId,
        unified_id: UnifiedId,
        segment_num: u32,
        slice_index: u32,
        adler32: u32,
        md5: String,
        dest_node_name: Option<String>,
    },
    #[serde(rename = "archive-key-final")]
    ArchiveKeyFinal {
        message_id: MessageId,
        unified_id: UnifiedId,
        segment_num: u32,
        slice_index: u32,
        total_size: u64,
        file_adler32: u32,
        file_md5: String,
        adler32: u32,
        md5: String,
        dest_node_name: Option<String>,
    },
    #[serde(rename = "archive-key-cancel")]
    ArchiveKeyCancel {
        message_id: MessageId,
        unified_id: UnifiedId,
        dest_node_name: Option<String>,
    },
    #[serde(rename = "destroy-key")]
    DestroyKey {
        message_id: MessageId,
        collection_id: u32,
        key: String,
        unified_id: UnifiedId,
        timestamp: i64,
        dest_node_name: Option<String>,
    },
    #[serde(rename = "retrieve-key-start")]
    RetrieveKeyStart {
        message_id: MessageId,
        collection_id: u32,
        key: String,
    },
    #[serde(rename = "retrieve-key-next")]
    RetrieveKeyNext {
        message_id: MessageId,
        unified_id: UnifiedId,
        slice_index: u32,
    },
    #[serde(rename = "request-handoffs")]
    RequestHandoffs {
        message_id: MessageId,
        node_id: u32,
        node_name: String,
        client_tag: String,
        client_address: String,
        request_timestamp: i64,
    },
}

impl Request {
    pub fn message_id(&self) -> MessageId {
        match self {
            Request::ArchiveKeyStart { message_id, .. }
            | Request::ArchiveKeyNext { message_id, .. }
            | Request::ArchiveKeyFinal { message_id, .. }
            | Request::ArchiveKeyCancel { message_id, .. }
            | Request::DestroyKey { message_id, .. }
            | Request::RetrieveKeyStart { message_id, .. }
            | Request::RetrieveKeyNext { message_id, .. }
            | Request::RequestHandoffs { message_id, .. } => *message_id,
        }
    }
}

/// Node → gateway (or node → node, for handoff acknowledgements) replies.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Reply {
    /// Generic acknowledgement used by start/next/final/cancel/destroy.
    #[serde(rename = "ack")]
    Ack {
        message_id: MessageId,
        result: ResultCode,
        error_message: Option<String>,
        /// Set only on a `destroy-key` ack: bytes removed, as reported by the node.
        size_removed: Option<u64>,
    },
    #[serde(rename = "retrieve-key-start-reply")]
    RetrieveStart {
        message_id: MessageId,
        result: ResultCode,
        error_message: Option<String>,
        found: Option<RetrieveStartFound>,
    },
    #[serde(rename = "retrieve-key-next-reply")]
    RetrieveNext {
        message_id: MessageId,
        result: ResultCode,
        error_message: Option<String>,
        segment: Option<SegmentHeader>,
    },
    #[serde(rename = "request-handoffs-reply")]
    HandoffAccepted {
        message_id: MessageId,
        accepted: bool,
    },
}

impl Reply {
    pub fn message_id(&self) -> MessageId {
        match self {
            Reply::Ack { message_id, .. }
            | Reply::RetrieveStart { message_id, .. }
            | Reply::RetrieveNext { message_id, .. }
            | Reply::HandoffAccepted { message_id, .. } => *message_id,
        }
    }

    /// The [`ResultCode`] carried by replies that have one. `HandoffAccepted`
    /// has no result code of its own; callers inspect `accepted` instead.
    pub fn result(&self) -> Option<ResultCode> {
        match self {
            Reply::Ack { result, .. }
            | Reply::RetrieveStart { result, .. }
            | Reply::RetrieveNext { result, .. } => Some(*result),
            Reply::HandoffAccepted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetrieveStartFound {
    pub unified_id: UnifiedId,
    pub total_slice_count: u32,
    /// Total plaintext byte length of the archived object, recorded at
    /// `archive-key-final` time. Used by the retriever to trim the erasure
    /// decoder's k-shard-aligned output of the final slice back to its true
    /// length.
    pub total_size: u64,
    /// Hex-encoded whole-file MD5 recorded at `archive-key-final` time, for
    /// the `HEAD /data/{key}` `Content-MD5` response.
    pub file_md5: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SegmentHeader {
    pub segment_num: u32,
    pub slice_index: u32,
    pub adler32: u32,
    pub md5: String,
}
