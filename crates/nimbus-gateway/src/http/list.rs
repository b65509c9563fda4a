use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use super::{caller_user, resolve_and_authorize, AppState};

/// `GET /data/?prefix=…`: JSON array of matching keys (spec §6). A thin
/// stub over the in-memory `KeyIndex`; a real deployment queries the
/// per-collection key database instead.
pub async fn list(State(state): State<Arc<AppState>>, Query(params): Query<BTreeMap<String, String>>, headers: HeaderMap) -> Response {
    let user = caller_user(&headers);
    let collection_id = match resolve_and_authorize(&state, &user, &params).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let prefix = params.get("prefix").map(String::as_str).unwrap_or("");
    let keys = state.key_index.list_prefix(collection_id, prefix).await;
    axum::Json(keys).into_response()
}
