use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use adler32::RollingAdler32;
use bytes::Bytes;
use futures::future::join_all;
use md5::Context as Md5Context;
use nimbus_client::{ArchiveFinal, ArchiveSlice, StartArchive, WriteAdapter};
use nimbus_erasure::Slicer;
use nimbus_wire::UnifiedId;
use tokio::io::AsyncRead;
use tracing::{info, warn};

use crate::cluster::Cluster;
use crate::error::GatewayError;

/// Totals recorded once an archive commits, for the accounting collaborator
/// and the `HEAD`/retrieve response (spec §4.6 "Commit").
pub struct ArchiveOutcome {
    pub unified_id: UnifiedId,
    pub total_size: u64,
    pub file_md5: [u8; 16],
    pub file_adler32: u32,
}

/// Drives one archive (HTTP `POST /data/{key}`) to completion across every
/// writer in the cluster, per spec §4.6.
pub struct Archiver {
    cluster: Arc<Cluster>,
}

impl Archiver {
    pub fn new(cluster: Arc<Cluster>) -> Self {
        Self { cluster }
    }

    pub async fn archive<R: AsyncRead + Unpin>(
        &self,
        collection_id: u32,
        key: String,
        declared_len: u64,
        meta: BTreeMap<String, String>,
        body: R,
    ) -> Result<ArchiveOutcome, GatewayError> {
        let writers = self.cluster.assemble_writers()?;
        let unified_id = UnifiedId::generate();
        let timestamp = unix_now();

        start_all(&writers, unified_id, collection_id, &key, timestamp, meta)
            .await
            .map_err(|e| self.abort(&writers, unified_id, e))?;

        match self.stream_slices(&writers, unified_id, declared_len, body).await {
            Ok(outcome) => {
                info!(%unified_id, total_size = outcome.total_size, "archive committed");
                Ok(outcome)
            }
            Err(e) => Err(self.abort(&writers, unified_id, e)),
        }
    }

    /// Best-effort cancellation of every writer, then re-raises the original
    /// error as `ArchiveFailed` (spec §4.6 step 4).
    fn abort(&self, writers: &[Arc<dyn WriteAdapter>], unified_id: UnifiedId, cause: GatewayError) -> GatewayError {
        let writers = writers.to_vec();
        tokio::spawn(async move {
            join_all(writers.iter().map(|w| w.cancel(unified_id))).await;
        });
        GatewayError::ArchiveFailed(cause.to_string())
    }

    async fn stream_slices<R: AsyncRead + Unpin>(
        &self,
        writers: &[Arc<dyn WriteAdapter>],
        unified_id: UnifiedId,
        declared_len: u64,
        body: R,
    ) -> Result<ArchiveOutcome, GatewayError> {
        let mut slicer = Slicer::new(body, declared_len);
        let mut file_md5 = Md5Context::new();
        let mut file_adler = RollingAdler32::new();
        let mut total_size: u64 = 0;
        let mut seq: u32 = 0;

        let mut current = slicer.next_slice().await?;

        loop {
            let Some(slice) = current else {
                break;
            };
            let next = slicer.next_slice().await?;
            let is_final = next.is_none();

            file_md5.consume(&slice);
            file_adler.update_buffer(&slice);
            total_size += slice.len() as u64;

            let segments = self.cluster.segmenter().encode(&slice)?;

            if is_final {
                let file_md5_digest = file_md5.clone().compute();
                send_final_all(
                    writers,
                    unified_id,
                    seq,
                    total_size,
                    file_adler.hash(),
                    &file_md5_digest,
                    segments,
                )
                .await?;
            } else {
                send_slice_all(writers, unified_id, seq, segments).await?;
            }

            seq += 1;
            current = next;
        }

        Ok(ArchiveOutcome {
            unified_id,
            total_size,
            file_md5: file_md5.compute().0,
            file_adler32: file_adler.hash(),
        })
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

async fn start_all(
    writers: &[Arc<dyn WriteAdapter>],
    unified_id: UnifiedId,
    collection_id: u32,
    key: &str,
    timestamp: i64,
    meta: BTreeMap<String, String>,
) -> Result<(), GatewayError> {
    let results = join_all(writers.iter().enumerate().map(|(idx, w)| {
        let meta = meta.clone();
        let key = key.to_string();
        async move {
            w.start_archive(StartArchive {
                unified_id,
                collection_id,
                key,
                timestamp,
                segment_num: idx as u32 + 1,
                meta,
            })
            .await
        }
    }))
    .await;
    first_error(results)
}

async fn send_slice_all(
    writers: &[Arc<dyn WriteAdapter>],
    unified_id: UnifiedId,
    slice_index: u32,
    segments: Vec<Bytes>,
) -> Result<(), GatewayError> {
    let results = join_all(writers.iter().zip(segments.into_iter()).enumerate().map(
        |(idx, (writer, payload))| {
            let adler32 = RollingAdler32::from_buffer(&payload).hash();
            let md5 = format!("{:x}", md5::compute(&payload));
            async move {
                writer
                    .archive_slice(ArchiveSlice {
                        unified_id,
                        segment_num: idx as u32 + 1,
                        slice_index,
                        adler32,
                        md5,
                        payload,
                    })
                    .await
            }
        },
    ))
    .await;
    first_error(results)
}

#[allow(clippy::too_many_arguments)]
async fn send_final_all(
    writers: &[Arc<dyn WriteAdapter>],
    unified_id: UnifiedId,
    slice_index: u32,
    total_size: u64,
    file_adler32: u32,
    file_md5: &md5::Digest,
    segments: Vec<Bytes>,
) -> Result<(), GatewayError> {
    let file_md5_hex = format!("{:x}", file_md5);
    let results = join_all(writers.iter().zip(segments.into_iter()).enumerate().map(
        |(idx, (writer, payload))| {
            let adler32 = RollingAdler32::from_buffer(&payload).hash();
            let md5 = format!("{:x}", md5::compute(&payload));
            let file_md5_hex = file_md5_hex.clone();
            async move {
                writer
                    .archive_final(ArchiveFinal {
                        unified_id,
                        segment_num: idx as u32 + 1,
                        slice_index,
                        total_size,
                        file_adler32,
                        file_md5: file_md5_hex,
                        adler32,
                        md5,
                        payload,
                    })
                    .await
            }
        },
    ))
    .await;
    first_error(results)
}

fn first_error<T>(results: Vec<Result<T, nimbus_client::WriteAdapterError>>) -> Result<(), GatewayError> {
    for result in results {
        if let Err(e) = result {
            warn!(error = %e, "writer rejected archive step");
            return Err(e.into());
        }
    }
    Ok(())
}
