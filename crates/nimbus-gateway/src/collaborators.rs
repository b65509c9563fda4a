//! Narrow interfaces onto the collaborators this repository's core sits
//! behind but does not implement: the collection/user database, the space
//! accounting ledger, the key listing index, and HTTP authentication (spec
//! §6). Each trait is paired with an in-memory stub sufficient to drive the
//! HTTP surface end to end in tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collection {0:?} not found")]
    NoSuchCollection(String),
    #[error("the default collection cannot be deleted")]
    DefaultCollectionUndeletable,
    #[error("authorization rejected")]
    Unauthorized,
}

impl IntoResponse for CollaboratorError {
    fn into_response(self) -> Response {
        let status = match &self {
            CollaboratorError::NoSuchCollection(_) => StatusCode::NOT_FOUND,
            CollaboratorError::DefaultCollectionUndeletable => StatusCode::BAD_REQUEST,
            CollaboratorError::Unauthorized => StatusCode::UNAUTHORIZED,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub created: String,
}

/// The collection/user database: collection_id ↔ name resolution, per
/// spec §6's `/customers/{user}/collections...` endpoints.
#[async_trait]
pub trait CollectionDirectory: Send + Sync {
    async fn list(&self, user: &str) -> Result<Vec<CollectionInfo>, CollaboratorError>;
    async fn create(&self, user: &str, name: &str) -> Result<(), CollaboratorError>;
    async fn delete(&self, user: &str, name: &str) -> Result<(), CollaboratorError>;
    async fn resolve(&self, user: &str, name: &str) -> Result<u32, CollaboratorError>;
}

/// In-memory stand-in: one `default` collection per user, ids handed out in
/// creation order starting at 1.
#[derive(Default)]
pub struct InMemoryCollectionDirectory {
    state: Mutex<BTreeMap<String, BTreeMap<String, u32>>>,
}

impl InMemoryCollectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_default(&self, user: &str) {
        let mut state = self.state.lock().expect("collection directory mutex poisoned");
        let collections = state.entry(user.to_string()).or_default();
        if collections.is_empty() {
            collections.insert("default".to_string(), 1);
        }
    }
}

#[async_trait]
impl CollectionDirectory for InMemoryCollectionDirectory {
    async fn list(&self, user: &str) -> Result<Vec<CollectionInfo>, CollaboratorError> {
        self.ensure_default(user);
        let state = self.state.lock().expect("collection directory mutex poisoned");
        Ok(state
            .get(user)
            .into_iter()
            .flat_map(|collections| collections.keys())
            .map(|name| CollectionInfo {
                name: name.clone(),
                created: "1970-01-01T00:00:00Z".to_string(),
            })
            .collect())
    }

    async fn create(&self, user: &str, name: &str) -> Result<(), CollaboratorError> {
        self.ensure_default(user);
        let mut state = self.state.lock().expect("collection directory mutex poisoned");
        let collections = state.entry(user.to_string()).or_default();
        let next_id = collections.values().copied().max().unwrap_or(0) + 1;
        collections.entry(name.to_string()).or_insert(next_id);
        Ok(())
    }

    async fn delete(&self, user: &str, name: &str) -> Result<(), CollaboratorError> {
        if name == "default" {
            return Err(CollaboratorError::DefaultCollectionUndeletable);
        }
        self.ensure_default(user);
        let mut state = self.state.lock().expect("collection directory mutex poisoned");
        let collections = state.entry(user.to_string()).or_default();
        if collections.remove(name).is_none() {
            return Err(CollaboratorError::NoSuchCollection(name.to_string()));
        }
        Ok(())
    }

    async fn resolve(&self, user: &str, name: &str) -> Result<u32, CollaboratorError> {
        self.ensure_default(user);
        let state = self.state.lock().expect("collection directory mutex poisoned");
        state
            .get(user)
            .and_then(|collections| collections.get(name))
            .copied()
            .ok_or_else(|| CollaboratorError::NoSuchCollection(name.to_string()))
    }
}

/// Space-usage accounting, invoked by the Archiver and Destroyer on success
/// (the `space_usage` query named in spec §6).
#[async_trait]
pub trait UsageAccountant: Send + Sync {
    async fn added(&self, collection_id: u32, timestamp: i64, bytes: u64);
    async fn removed(&self, collection_id: u32, timestamp: i64, bytes: u64);
    async fn space_usage(&self, collection_id: u32) -> serde_json::Value;
}

#[derive(Default)]
pub struct InMemoryUsageAccountant {
    bytes_added: Mutex<BTreeMap<u32, u64>>,
    bytes_removed: Mutex<BTreeMap<u32, u64>>,
}

impl InMemoryUsageAccountant {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageAccountant for InMemoryUsageAccountant {
    async fn added(&self, collection_id: u32, _timestamp: i64, bytes: u64) {
        *self.bytes_added.lock().expect("accountant mutex poisoned").entry(collection_id).or_insert(0) += bytes;
    }

    async fn removed(&self, collection_id: u32, _timestamp: i64, bytes: u64) {
        *self.bytes_removed.lock().expect("accountant mutex poisoned").entry(collection_id).or_insert(0) += bytes;
    }

    async fn space_usage(&self, collection_id: u32) -> serde_json::Value {
        let added = *self.bytes_added.lock().expect("accountant mutex poisoned").get(&collection_id).unwrap_or(&0);
        let removed = *self.bytes_removed.lock().expect("accountant mutex poisoned").get(&collection_id).unwrap_or(&0);
        serde_json::json!({ "bytes_added": added, "bytes_removed": removed, "bytes_used": added.saturating_sub(removed) })
    }
}

/// Key listing for `GET /data/?prefix=…`. The real implementation queries a
/// per-collection key database; this stub tracks only what this process
/// itself archived or destroyed, which is sufficient to exercise the HTTP
/// surface end to end.
#[async_trait]
pub trait KeyIndex: Send + Sync {
    async fn record_archived(&self, collection_id: u32, key: &str);
    async fn record_destroyed(&self, collection_id: u32, key: &str);
    async fn list_prefix(&self, collection_id: u32, prefix: &str) -> Vec<String>;
}

#[derive(Default)]
pub struct InMemoryKeyIndex {
    live_keys: Mutex<BTreeMap<u32, BTreeSet<String>>>,
}

impl InMemoryKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyIndex for InMemoryKeyIndex {
    async fn record_archived(&self, collection_id: u32, key: &str) {
        self.live_keys
            .lock()
            .expect("key index mutex poisoned")
            .entry(collection_id)
            .or_default()
            .insert(key.to_string());
    }

    async fn record_destroyed(&self, collection_id: u32, key: &str) {
        if let Some(keys) = self.live_keys.lock().expect("key index mutex poisoned").get_mut(&collection_id) {
            keys.remove(key);
        }
    }

    async fn list_prefix(&self, collection_id: u32, prefix: &str) -> Vec<String> {
        self.live_keys
            .lock()
            .expect("key index mutex poisoned")
            .get(&collection_id)
            .into_iter()
            .flat_map(|keys| keys.iter())
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// HTTP authentication/authorization, per spec §7's "authorization rejection
/// → 401". The stub accepts every request; a real deployment checks a
/// signed request header against the collection's owning user.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authorize(&self, user: &str, collection_id: u32) -> Result<(), CollaboratorError>;
}

pub struct AllowAllAuthenticator;

#[async_trait]
impl Authenticator for AllowAllAuthenticator {
    async fn authorize(&self, _user: &str, _collection_id: u32) -> Result<(), CollaboratorError> {
        Ok(())
    }
}
