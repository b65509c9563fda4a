//! End-to-end exercise of the HTTP surface (spec §6) over a small in-process
//! fake cluster: three fake storage nodes speaking the real wire schema,
//! wired up through the exact `Router` `main.rs` serves.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_LENGTH;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use nimbus_client::{ClusterClients, Dialer, NodeClient};
use nimbus_erasure::Segmenter;
use nimbus_gateway::collaborators::{AllowAllAuthenticator, InMemoryCollectionDirectory, InMemoryKeyIndex, InMemoryUsageAccountant};
use nimbus_gateway::http::{build_router, AppState};
use nimbus_gateway::Cluster;
use nimbus_wire::message::RetrieveStartFound;
use nimbus_wire::{framing, Reply, Request as WireRequest, ResultCode, SegmentHeader, Topology, UnifiedId};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use tower::ServiceExt;

struct OneShotDialer {
    conn: AsyncMutex<Option<DuplexStream>>,
}

#[async_trait]
impl Dialer for OneShotDialer {
    type Reader = ReadHalf<DuplexStream>;
    type Writer = WriteHalf<DuplexStream>;

    async fn dial(&self) -> std::io::Result<(Self::Reader, Self::Writer)> {
        let mut conn = self.conn.lock().await;
        match conn.take() {
            Some(stream) => Ok(tokio::io::split(stream)),
            None => Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "spent")),
        }
    }
}

/// One object this node holds: its own segment of every slice, plus the
/// whole-object metadata the real node would persist at `archive-key-final`.
struct StoredObject {
    unified_id: UnifiedId,
    slices: Vec<Bytes>,
    total_size: u64,
    file_md5: String,
}

/// A minimal, single-node storage backend speaking enough of the wire
/// protocol to support one full archive → retrieve → destroy cycle.
async fn run_fake_storage_node(segment_num: u32, mut stream: DuplexStream) {
    let mut objects: HashMap<(u32, String), StoredObject> = HashMap::new();
    let mut by_unified_id: HashMap<UnifiedId, (u32, String)> = HashMap::new();

    loop {
        let (request, payload): (WireRequest, Bytes) = match framing::read_frame(&mut stream).await {
            Ok(v) => v,
            Err(_) => return,
        };

        let reply = match &request {
            WireRequest::ArchiveKeyStart {
                message_id,
                unified_id,
                collection_id,
                key,
                ..
            } => {
                objects.insert(
                    (*collection_id, key.clone()),
                    StoredObject {
                        unified_id: *unified_id,
                        slices: Vec::new(),
                        total_size: 0,
                        file_md5: String::new(),
                    },
                );
                by_unified_id.insert(*unified_id, (*collection_id, key.clone()));
                Reply::Ack {
                    message_id: *message_id,
                    result: ResultCode::Ok,
                    error_message: None,
                    size_removed: None,
                }
            }
            WireRequest::ArchiveKeyNext { message_id, unified_id, .. } => {
                if let Some(id) = by_unified_id.get(unified_id) {
                    objects.get_mut(id).expect("id tracked in both maps").slices.push(payload);
                }
                Reply::Ack {
                    message_id: *message_id,
                    result: ResultCode::Ok,
                    error_message: None,
                    size_removed: None,
                }
            }
            WireRequest::ArchiveKeyFinal {
                message_id,
                unified_id,
                total_size,
                file_md5,
                ..
            } => {
                if let Some(id) = by_unified_id.get(unified_id) {
                    let obj = objects.get_mut(id).expect("id tracked in both maps");
                    obj.slices.push(payload);
                    obj.total_size = *total_size;
                    obj.file_md5 = file_md5.clone();
                }
                Reply::Ack {
                    message_id: *message_id,
                    result: ResultCode::Ok,
                    error_message: None,
                    size_removed: None,
                }
            }
            WireRequest::RetrieveKeyStart {
                message_id,
                collection_id,
                key,
            } => {
                let object = objects.get(&(*collection_id, key.clone()));
                let found = object.map(|obj| RetrieveStartFound {
                    unified_id: obj.unified_id,
                    total_slice_count: obj.slices.len() as u32,
                    total_size: obj.total_size,
                    file_md5: obj.file_md5.clone(),
                });
                let reply_payload = object.map(|obj| obj.slices[0].clone()).unwrap_or_default();
                let reply = Reply::RetrieveStart {
                    message_id: *message_id,
                    result: ResultCode::Ok,
                    error_message: None,
                    found,
                };
                if framing::write_frame(&mut stream, &reply, &reply_payload).await.is_err() {
                    return;
                }
                continue;
            }
            WireRequest::RetrieveKeyNext {
                message_id,
                unified_id,
                slice_index,
            } => {
                let Some(id) = by_unified_id.get(unified_id) else {
                    let reply = Reply::RetrieveNext {
                        message_id: *message_id,
                        result: ResultCode::NotFound,
                        error_message: Some("unknown unified_id".to_string()),
                        segment: None,
                    };
                    if framing::write_frame(&mut stream, &reply, b"").await.is_err() {
                        return;
                    }
                    continue;
                };
                let obj = objects.get(id).expect("id tracked in both maps");
                let reply_payload = obj.slices[*slice_index as usize].clone();
                let reply = Reply::RetrieveNext {
                    message_id: *message_id,
                    result: ResultCode::Ok,
                    error_message: None,
                    segment: Some(SegmentHeader {
                        segment_num,
                        slice_index: *slice_index,
                        adler32: 0,
                        md5: String::new(),
                    }),
                };
                if framing::write_frame(&mut stream, &reply, &reply_payload).await.is_err() {
                    return;
                }
                continue;
            }
            WireRequest::DestroyKey {
                message_id,
                collection_id,
                key,
                ..
            } => {
                let removed = objects.remove(&(*collection_id, key.clone()));
                if let Some(obj) = &removed {
                    by_unified_id.remove(&obj.unified_id);
                }
                Reply::Ack {
                    message_id: *message_id,
                    result: ResultCode::Ok,
                    error_message: None,
                    size_removed: removed.map(|obj| obj.total_size),
                }
            }
            WireRequest::ArchiveKeyCancel { message_id, .. } | WireRequest::RequestHandoffs { message_id, .. } => Reply::Ack {
                message_id: *message_id,
                result: ResultCode::Ok,
                error_message: None,
                size_removed: None,
            },
        };

        if framing::write_frame(&mut stream, &reply, b"").await.is_err() {
            return;
        }
    }
}

async fn connected_node(name: &str, segment_num: u32) -> Arc<NodeClient> {
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    tokio::spawn(run_fake_storage_node(segment_num, server_side));
    let dialer = OneShotDialer {
        conn: AsyncMutex::new(Some(client_side)),
    };
    let client = NodeClient::connect(name.to_string(), dialer);
    for _ in 0..100 {
        if client.connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(client.connected(), "fake storage node never connected");
    client
}

async fn test_app() -> Arc<AppState> {
    let mut by_name = HashMap::new();
    for (i, name) in ["n1", "n2", "n3"].iter().enumerate() {
        by_name.insert(name.to_string(), connected_node(name, i as u32 + 1).await);
    }
    let clients = ClusterClients::from_clients(by_name);
    let topology = Topology::new(vec!["n1".to_string(), "n2".to_string(), "n3".to_string()]);
    let segmenter = Segmenter::new(2, 3).unwrap();
    let cluster = Arc::new(Cluster::new(topology, clients, segmenter, 2, Duration::from_secs(2)));

    Arc::new(AppState {
        cluster,
        collections: Arc::new(InMemoryCollectionDirectory::new()),
        accounting: Arc::new(InMemoryUsageAccountant::new()),
        key_index: Arc::new(InMemoryKeyIndex::new()),
        authenticator: Arc::new(AllowAllAuthenticator),
    })
}

#[tokio::test]
async fn archive_then_retrieve_then_destroy_round_trips() {
    let state = test_app().await;
    let router = build_router(state);

    let body = b"this object survives a full archive, retrieve, and destroy cycle".to_vec();
    let archive_request = Request::builder()
        .method("POST")
        .uri("/data/round-trip-key")
        .header(CONTENT_LENGTH, body.len().to_string())
        .body(Body::from(body.clone()))
        .unwrap();
    let response = router.clone().oneshot(archive_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("content-md5"));

    let get_request = Request::builder().method("GET").uri("/data/round-trip-key").body(Body::empty()).unwrap();
    let response = router.clone().oneshot(get_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let retrieved = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&retrieved[..], &body[..]);

    let head_request = Request::builder().method("HEAD").uri("/data/round-trip-key").body(Body::empty()).unwrap();
    let response = router.clone().oneshot(head_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-length").and_then(|v| v.to_str().ok()),
        Some(body.len().to_string()).as_deref()
    );

    let delete_request = Request::builder().method("DELETE").uri("/data/round-trip-key").body(Body::empty()).unwrap();
    let response = router.clone().oneshot(delete_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let get_after_delete = Request::builder().method("GET").uri("/data/round-trip-key").body(Body::empty()).unwrap();
    let response = router.oneshot(get_after_delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn retrieving_an_unknown_key_is_not_found() {
    let state = test_app().await;
    let router = build_router(state);

    let request = Request::builder().method("GET").uri("/data/never-archived").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn archive_without_content_length_is_rejected() {
    let state = test_app().await;
    let router = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/data/no-length")
        .body(Body::from(b"x".to_vec()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::LENGTH_REQUIRED);
}

#[tokio::test]
async fn collections_can_be_listed_and_created() {
    let state = test_app().await;
    let router = build_router(state);

    let list_request = Request::builder().method("GET").uri("/customers/alice/collections").body(Body::empty()).unwrap();
    let response = router.clone().oneshot(list_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let collections: Vec<(String, String)> = serde_json::from_slice(&body).unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].0, "default");

    let create_request = Request::builder()
        .method("POST")
        .uri("/customers/alice/collections/extra")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(create_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
