use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use nimbus_client::NodeClient;
use nimbus_wire::{MessageId, Reply, Request, UnifiedId};
use tracing::warn;

use crate::cluster::Cluster;
use crate::error::GatewayError;

#[derive(Clone)]
struct ContributingReader {
    name: String,
    client: Arc<NodeClient>,
}

/// Resolves an object and hands back a [`RetrieveStream`] that yields its
/// plaintext slice by slice, per spec §4.7.
pub struct Retriever {
    cluster: Arc<Cluster>,
}

impl Retriever {
    pub fn new(cluster: Arc<Cluster>) -> Self {
        Self { cluster }
    }

    pub async fn start(&self, collection_id: u32, key: String) -> Result<RetrieveStream, GatewayError> {
        let readers = self.cluster.connected_readers()?;
        let k = self.cluster.segmenter().k();
        let reply_timeout = self.cluster.reply_timeout();

        let replies = join_all(readers.iter().map(|(name, client)| {
            let key = key.clone();
            let client = client.clone();
            let name = name.clone();
            async move {
                let request = Request::RetrieveKeyStart {
                    message_id: MessageId::generate(),
                    collection_id,
                    key,
                };
                let result = client.send(request, Bytes::new(), reply_timeout).await;
                (name, client, result)
            }
        }))
        .await;

        // The authoritative unified_id is the largest any reader reports;
        // replies naming a smaller one are stale and ignored (spec §4.7.3).
        let authoritative = replies
            .iter()
            .filter_map(|(_, _, result)| match result {
                Ok((Reply::RetrieveStart { found: Some(f), .. }, _)) => Some(f.unified_id),
                _ => None,
            })
            .max();
        let Some(unified_id) = authoritative else {
            return Err(GatewayError::NotFound);
        };

        let mut contributing = Vec::new();
        let mut first_slice_segments = BTreeMap::new();
        let mut total_slice_count = 0u32;
        let mut total_size = 0u64;
        let mut file_md5 = String::new();

        for (name, client, result) in replies {
            let Ok((Reply::RetrieveStart { found: Some(found), .. }, payload)) = result else {
                continue;
            };
            if found.unified_id != unified_id {
                continue;
            }
            let Some(segment_num) = self.cluster.topology().segment_for_node(&name) else {
                continue;
            };
            total_slice_count = found.total_slice_count;
            total_size = found.total_size;
            file_md5 = found.file_md5;
            first_slice_segments.insert(segment_num, payload);
            contributing.push(ContributingReader { name, client });
        }

        if contributing.len() < k {
            return Err(GatewayError::RetrieveFailed(format!(
                "only {} of {k} required segments carried the current unified_id",
                contributing.len()
            )));
        }

        Ok(RetrieveStream {
            cluster: self.cluster.clone(),
            unified_id,
            total_slice_count,
            total_size,
            file_md5,
            bytes_emitted: 0,
            next_slice_index: 0,
            pending_first_slice: Some(first_slice_segments),
            contributing,
        })
    }
}

/// A lazy, finite, single-pass sequence of decoded plaintext slices (spec §9
/// "streaming generators for retrieve"). Dropping it without exhausting it
/// simply stops pulling; no explicit close message exists in the wire
/// schema, so there is nothing further to send.
pub struct RetrieveStream {
    cluster: Arc<Cluster>,
    unified_id: UnifiedId,
    total_slice_count: u32,
    total_size: u64,
    file_md5: String,
    bytes_emitted: u64,
    next_slice_index: u32,
    pending_first_slice: Option<BTreeMap<u32, Bytes>>,
    contributing: Vec<ContributingReader>,
}

impl RetrieveStream {
    pub fn unified_id(&self) -> UnifiedId {
        self.unified_id
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Hex-encoded whole-file MD5, for the `HEAD /data/{key}` response.
    pub fn file_md5_hex(&self) -> &str {
        &self.file_md5
    }

    /// Pulls and decodes the next slice. Returns `Ok(None)` once every slice
    /// has been yielded.
    pub async fn next_slice(&mut self) -> Result<Option<Bytes>, GatewayError> {
        if self.next_slice_index >= self.total_slice_count {
            return Ok(None);
        }
        let slice_index = self.next_slice_index;
        let is_final = slice_index + 1 == self.total_slice_count;

        let segments = match self.pending_first_slice.take() {
            Some(first) => first,
            None => self.gather_slice(slice_index).await?,
        };

        let mut decoded = self.cluster.segmenter().decode(&segments)?;
        if is_final {
            let remaining = self.total_size.saturating_sub(self.bytes_emitted) as usize;
            decoded.truncate(remaining);
        }
        self.bytes_emitted += decoded.len() as u64;
        self.next_slice_index += 1;
        Ok(Some(decoded))
    }

    /// Requests `slice_index` from every contributing reader and decodes as
    /// soon as `k` distinct segments have arrived, without waiting for the
    /// rest (spec §4.7 straggler policy). Readers that error or time out are
    /// dropped from the contributing set for the remainder of the object.
    async fn gather_slice(&mut self, slice_index: u32) -> Result<BTreeMap<u32, Bytes>, GatewayError> {
        let k = self.cluster.segmenter().k();
        let reply_timeout = self.cluster.reply_timeout();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for (idx, reader) in self.contributing.iter().enumerate() {
            let client = reader.client.clone();
            let unified_id = self.unified_id;
            let tx = tx.clone();
            tokio::spawn(async move {
                let request = Request::RetrieveKeyNext {
                    message_id: MessageId::generate(),
                    unified_id,
                    slice_index,
                };
                let result = client.send(request, Bytes::new(), reply_timeout).await;
                // The receiver may already be gone if `k` was reached by
                // other readers first; that's fine, this is best-effort.
                let _ = tx.send((idx, result));
            });
        }
        drop(tx);

        let mut segments = BTreeMap::new();
        let mut dead = HashSet::new();
        while let Some((idx, result)) = rx.recv().await {
            match result {
                Ok((Reply::RetrieveNext { result: code, segment: Some(header), .. }, payload)) if code.is_ok() => {
                    segments.insert(header.segment_num, payload);
                }
                Ok(_) => {
                    dead.insert(idx);
                }
                Err(e) => {
                    warn!(reader = %self.contributing[idx].name, error = %e, "dropping straggler reader");
                    dead.insert(idx);
                }
            }
            if segments.len() >= k {
                break;
            }
        }

        if !dead.is_empty() {
            self.contributing = self
                .contributing
                .iter()
                .enumerate()
                .filter(|(i, _)| !dead.contains(i))
                .map(|(_, r)| r.clone())
                .collect();
        }

        if segments.len() < k {
            return Err(GatewayError::RetrieveFailed(format!(
                "slice {slice_index} only gathered {} of {k} required segments",
                segments.len()
            )));
        }
        if self.contributing.len() < k {
            return Err(GatewayError::RetrieveFailed(format!(
                "contributing reader set fell to {} below the required {k}",
                self.contributing.len()
            )));
        }
        Ok(segments)
    }
}
