use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use nimbus_client::{Destroy, WriteAdapter, WriteAdapterError};
use nimbus_wire::UnifiedId;
use tracing::warn;

use crate::cluster::Cluster;
use crate::error::GatewayError;

/// Tombstone fan-out: same topology as [`crate::Archiver`] but single-shot
/// (spec §4.8).
pub struct Destroyer {
    cluster: Arc<Cluster>,
}

impl Destroyer {
    pub fn new(cluster: Arc<Cluster>) -> Self {
        Self { cluster }
    }

    /// Returns the size the nodes agree was removed: the value reported by a
    /// strict majority of writers, or `0` if the reports are split (spec
    /// §4.8).
    pub async fn destroy(
        &self,
        collection_id: u32,
        key: String,
        unified_id: UnifiedId,
        timestamp: i64,
    ) -> Result<u64, GatewayError> {
        let writers = self.cluster.assemble_writers()?;

        let results: Vec<Result<Option<u64>, WriteAdapterError>> = join_all(writers.iter().map(|w| {
            let key = key.clone();
            async move {
                w.destroy(Destroy {
                    unified_id,
                    collection_id,
                    key,
                    timestamp,
                })
                .await
            }
        }))
        .await;

        let mut reported: HashMap<u64, usize> = HashMap::new();
        for result in results {
            match result {
                Ok(Some(size)) => *reported.entry(size).or_insert(0) += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "writer rejected destroy");
                    return Err(GatewayError::DestroyFailed(e.to_string()));
                }
            }
        }

        let total_votes = writers.len();
        Ok(reported
            .into_iter()
            .find(|(_, count)| *count * 2 > total_votes)
            .map(|(size, _)| size)
            .unwrap_or(0))
    }
}
