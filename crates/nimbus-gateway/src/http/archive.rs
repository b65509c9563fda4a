use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use super::{caller_user, resolve_and_authorize, AppState, META_PREFIX};
use crate::archiver::Archiver;

/// `POST /data/{key}`, per spec §6: body is the payload; `x-amz-meta-`
/// (or this system's own meta-prefix) query parameters become metadata.
pub async fn archive(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    request: axum::extract::Request,
) -> Response {
    let user = caller_user(&headers);
    let collection_id = match resolve_and_authorize(&state, &user, &params).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let meta: BTreeMap<String, String> = params
        .into_iter()
        .filter_map(|(k, v)| k.strip_prefix(META_PREFIX).map(|stripped| (stripped.to_string(), v)))
        .collect();

    let declared_len: u64 = match headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
    {
        Some(len) => len,
        None => return (axum::http::StatusCode::LENGTH_REQUIRED, "Content-Length is required").into_response(),
    };

    let body_stream = request
        .into_body()
        .into_data_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
    let body = StreamReader::new(body_stream);

    let archiver = Archiver::new(state.cluster.clone());
    match archiver.archive(collection_id, key.clone(), declared_len, meta, body).await {
        Ok(outcome) => {
            state.accounting.added(collection_id, 0, outcome.total_size).await;
            state.key_index.record_archived(collection_id, &key).await;
            let md5_b64 = base64::engine::general_purpose::STANDARD.encode(outcome.file_md5);
            ([("Content-MD5", md5_b64)], "OK").into_response()
        }
        Err(e) => e.into_response(),
    }
}

