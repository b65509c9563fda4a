use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use super::{caller_user, resolve_and_authorize, AppState};
use crate::destroyer::Destroyer;
use nimbus_wire::UnifiedId;

/// `DELETE /data/{key}`: tombstone write (spec §6).
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let user = caller_user(&headers);
    let collection_id = match resolve_and_authorize(&state, &user, &params).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let destroyer = Destroyer::new(state.cluster.clone());
    let unified_id = UnifiedId::generate();
    let timestamp = unix_now();
    match destroyer.destroy(collection_id, key.clone(), unified_id, timestamp).await {
        Ok(size_removed) => {
            state.accounting.removed(collection_id, timestamp, size_removed).await;
            state.key_index.record_destroyed(collection_id, &key).await;
            "OK".into_response()
        }
        Err(e) => e.into_response(),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}
