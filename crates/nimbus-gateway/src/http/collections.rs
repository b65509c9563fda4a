use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use super::AppState;

/// `GET /customers/{user}/collections` → JSON array of `[name, created]`.
pub async fn list(State(state): State<Arc<AppState>>, Path(user): Path<String>) -> Response {
    match state.collections.list(&user).await {
        Ok(collections) => {
            let rows: Vec<(String, String)> = collections.into_iter().map(|c| (c.name, c.created)).collect();
            axum::Json(rows).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// `POST /customers/{user}/collections/{name}` → `"OK"`.
pub async fn create(State(state): State<Arc<AppState>>, Path((user, name)): Path<(String, String)>) -> Response {
    match state.collections.create(&user, &name).await {
        Ok(()) => "OK".into_response(),
        Err(e) => e.into_response(),
    }
}

/// `DELETE /customers/{user}/collections/{name}` → `"OK"`; the default
/// collection cannot be deleted.
pub async fn destroy(State(state): State<Arc<AppState>>, Path((user, name)): Path<(String, String)>) -> Response {
    match state.collections.delete(&user, &name).await {
        Ok(()) => "OK".into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /customers/{user}/collections/{name}?action=space_usage` → JSON
/// object from accounting.
pub async fn usage(State(state): State<Arc<AppState>>, Path((user, name)): Path<(String, String)>) -> Response {
    let collection_id = match state.collections.resolve(&user, &name).await {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    axum::Json(state.accounting.space_usage(collection_id).await).into_response()
}
