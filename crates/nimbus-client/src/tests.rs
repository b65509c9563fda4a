//! Integration-style tests exercising `DataWriter` and `HandoffClient` over
//! in-process fake node sockets.

#[cfg(test)]
mod common {
    use async_trait::async_trait;
    use bytes::Bytes;
    use nimbus_wire::{framing, Reply, Request, ResultCode};
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use tokio::sync::Mutex as AsyncMutex;

    use crate::dialer::Dialer;
    use crate::node_client::NodeClient;
    use std::sync::Arc;
    use std::time::Duration;

    /// A fake node that acks everything it reads, optionally reporting a
    /// fixed result code instead of `Ok`.
    pub struct FakeNode {
        result: ResultCode,
    }

    impl FakeNode {
        pub fn always_ok() -> Self {
            Self { result: ResultCode::Ok }
        }

        pub fn always_rejects() -> Self {
            Self {
                result: ResultCode::InvalidRequest,
            }
        }

        async fn run(self, mut stream: DuplexStream) {
            loop {
                let (request, _payload): (Request, Bytes) = match framing::read_frame(&mut stream).await {
                    Ok(v) => v,
                    Err(_) => return,
                };
                let reply = Reply::Ack {
                    message_id: request.message_id(),
                    result: self.result,
                    error_message: if self.result.is_ok() {
                        None
                    } else {
                        Some("rejected".to_string())
                    },
                    size_removed: match &request {
                        Request::DestroyKey { .. } => Some(42),
                        _ => None,
                    },
                };
                if framing::write_frame(&mut stream, &reply, b"").await.is_err() {
                    return;
                }
            }
        }
    }

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

    pub async fn connected_client(name: &str, node: FakeNode) -> Arc<NodeClient> {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        tokio::spawn(node.run(server_side));
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
        assert!(client.connected(), "fake node never connected");
        client
    }

    pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
}

#[cfg(test)]
mod data_writer_tests {
    use super::common::{connected_client, FakeNode, REPLY_TIMEOUT};
    use crate::write_adapter::{StartArchive, WriteAdapter, WriteAdapterError};
    use crate::DataWriter;
    use nimbus_wire::UnifiedId;
    use std::collections::BTreeMap;

    fn start_req(unified_id: UnifiedId) -> StartArchive {
        StartArchive {
            unified_id,
            collection_id: 1,
            key: "some/key".to_string(),
            timestamp: 0,
            segment_num: 1,
            meta: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn start_archive_then_second_start_is_rejected() {
        let client = connected_client("node01", FakeNode::always_ok()).await;
        let writer = DataWriter::new(client, REPLY_TIMEOUT);

        let unified_id = UnifiedId::generate();
        writer.start_archive(start_req(unified_id)).await.unwrap();

        let err = writer.start_archive(start_req(UnifiedId::generate())).await.unwrap_err();
        assert!(matches!(err, WriteAdapterError::AlreadyBusy(id) if id == unified_id));
    }

    #[tokio::test]
    async fn archive_final_releases_the_writer_for_reuse() {
        let client = connected_client("node01", FakeNode::always_ok()).await;
        let writer = DataWriter::new(client, REPLY_TIMEOUT);

        let first = UnifiedId::generate();
        writer.start_archive(start_req(first)).await.unwrap();
        writer
            .archive_final(crate::write_adapter::ArchiveFinal {
                unified_id: first,
                segment_num: 1,
                slice_index: 0,
                total_size: 0,
                file_adler32: 0,
                file_md5: String::new(),
                adler32: 0,
                md5: String::new(),
                payload: bytes::Bytes::new(),
            })
            .await
            .unwrap();

        // A new archive can now start on the same writer.
        writer.start_archive(start_req(UnifiedId::generate())).await.unwrap();
    }

    #[tokio::test]
    async fn remote_rejection_surfaces_as_node_error() {
        let client = connected_client("node01", FakeNode::always_rejects()).await;
        let writer = DataWriter::new(client, REPLY_TIMEOUT);

        let err = writer.start_archive(start_req(UnifiedId::generate())).await.unwrap_err();
        assert!(matches!(err, WriteAdapterError::Node(_)));
    }
}

#[cfg(test)]
mod handoff_client_tests {
    use super::common::{connected_client, FakeNode, REPLY_TIMEOUT};
    use crate::write_adapter::{Destroy, WriteAdapter, WriteAdapterError};
    use crate::HandoffClient;
    use nimbus_wire::UnifiedId;

    #[tokio::test]
    async fn destroy_succeeds_only_when_both_backups_acknowledge() {
        let a = connected_client("backup01", FakeNode::always_ok()).await;
        let b = connected_client("backup02", FakeNode::always_ok()).await;
        let handoff = HandoffClient::new("node03", [a, b], REPLY_TIMEOUT);

        let removed = handoff
            .destroy(Destroy {
                unified_id: UnifiedId::generate(),
                collection_id: 1,
                key: "k".to_string(),
                timestamp: 0,
            })
            .await
            .unwrap();
        assert_eq!(removed, Some(42));
    }

    #[tokio::test]
    async fn one_backup_rejecting_fails_the_whole_handoff() {
        let a = connected_client("backup01", FakeNode::always_ok()).await;
        let b = connected_client("backup02", FakeNode::always_rejects()).await;
        let handoff = HandoffClient::new("node03", [a, b], REPLY_TIMEOUT);

        let err = handoff
            .destroy(Destroy {
                unified_id: UnifiedId::generate(),
                collection_id: 1,
                key: "k".to_string(),
                timestamp: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WriteAdapterError::HandoffFailed(_)));
    }

    #[tokio::test]
    async fn node_name_reports_the_substituted_for_primary() {
        let a = connected_client("backup01", FakeNode::always_ok()).await;
        let b = connected_client("backup02", FakeNode::always_ok()).await;
        let handoff = HandoffClient::new("node03", [a, b], REPLY_TIMEOUT);
        assert_eq!(handoff.node_name(), "node03");
    }
}
