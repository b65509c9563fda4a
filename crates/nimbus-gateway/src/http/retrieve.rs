use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use base64::Engine;

use super::{caller_user, resolve_and_authorize, AppState};
use crate::retriever::{Retriever, RetrieveStream};

/// `GET /data/{key}`: streams the decoded plaintext body (spec §6).
pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let retrieve_stream = match start_retrieve(&state, &headers, &params, key).await {
        Ok(rs) => rs,
        Err(resp) => return resp,
    };

    let stream = futures::stream::unfold(Some(retrieve_stream), |state| async move {
        let mut rs = state?;
        match rs.next_slice().await {
            Ok(Some(bytes)) => Some((Ok::<_, io::Error>(bytes), Some(rs))),
            Ok(None) => None,
            Err(e) => Some((Err(io::Error::new(io::ErrorKind::Other, e.to_string())), None)),
        }
    });

    Response::builder()
        .status(axum::http::StatusCode::OK)
        .body(Body::from_stream(stream))
        .expect("static status and streamed body never fail to build")
}

/// `HEAD /data/{key}`: size + base64 MD5 in `Content-MD5` (spec §6), with no
/// body. Resolves the object the same way `GET` does but discards the
/// stream after reading its header.
pub async fn head(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let retrieve_stream = match start_retrieve(&state, &headers, &params, key).await {
        Ok(rs) => rs,
        Err(resp) => return resp,
    };
    let md5_b64 = match hex::decode(retrieve_stream.file_md5_hex()) {
        Ok(raw) => base64::engine::general_purpose::STANDARD.encode(raw),
        Err(_) => String::new(),
    };
    (
        [
            ("Content-Length", retrieve_stream.total_size().to_string()),
            ("Content-MD5", md5_b64),
        ],
        "",
    )
        .into_response()
}

async fn start_retrieve(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    params: &BTreeMap<String, String>,
    key: String,
) -> Result<RetrieveStream, Response> {
    let user = caller_user(headers);
    let collection_id = resolve_and_authorize(state, &user, params).await?;
    let retriever = Retriever::new(state.cluster.clone());
    retriever.start(collection_id, key).await.map_err(IntoResponse::into_response)
}
