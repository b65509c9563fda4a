//! The HTTP surface named in spec §6, served with `axum`.

mod archive;
mod collections;
mod destroy;
mod list;
mod retrieve;

use std::sync::Arc;

use axum::routing::{delete, get, head, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::cluster::Cluster;
use crate::collaborators::{Authenticator, CollectionDirectory, KeyIndex, UsageAccountant};

/// Shared, read-only application state handed to every handler.
pub struct AppState {
    pub cluster: Arc<Cluster>,
    pub collections: Arc<dyn CollectionDirectory>,
    pub accounting: Arc<dyn UsageAccountant>,
    pub key_index: Arc<dyn KeyIndex>,
    pub authenticator: Arc<dyn Authenticator>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/customers/:user/collections", get(collections::list))
        .route(
            "/customers/:user/collections/:name",
            post(collections::create).delete(collections::destroy).get(collections::usage),
        )
        .route("/data/", get(list::list))
        .route(
            "/data/:key",
            post(archive::archive).get(retrieve::retrieve).head(retrieve::head).delete(destroy::destroy),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Re-exported so submodules don't each repeat the same imports.
pub(crate) use axum::extract::{Path, Query, State};
pub(crate) use axum::http::StatusCode;
pub(crate) use axum::response::IntoResponse;

/// The caller identity and meta-prefix header pulled off of every `/data/*`
/// request. A real deployment derives `user`/`collection` from the request's
/// `Host` header (spec §6: "host selects collection"); this stands in for
/// that resolution with an explicit header, which is enough to drive the
/// surface end to end in tests.
pub(crate) const USER_HEADER: &str = "x-nimbusio-user";
pub(crate) const DEFAULT_USER: &str = "anonymous";
pub(crate) const DEFAULT_COLLECTION: &str = "default";
pub(crate) const META_PREFIX: &str = "x-amz-meta-";

pub(crate) fn caller_user(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_USER)
        .to_string()
}

/// Resolves `?collection=` (defaulting to `default`) to a collection id,
/// then checks authorization, returning a ready-to-send error response for
/// either failure.
pub(crate) async fn resolve_and_authorize(
    state: &AppState,
    user: &str,
    params: &std::collections::BTreeMap<String, String>,
) -> Result<u32, axum::response::Response> {
    use axum::response::IntoResponse;
    let collection_name = params.get("collection").map(String::as_str).unwrap_or(DEFAULT_COLLECTION);
    let collection_id = state
        .collections
        .resolve(user, collection_name)
        .await
        .map_err(IntoResponse::into_response)?;
    state
        .authenticator
        .authorize(user, collection_id)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(collection_id)
}
