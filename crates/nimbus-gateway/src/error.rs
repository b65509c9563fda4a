use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nimbus_client::{NodeClientError, WriteAdapterError};
use nimbus_erasure::{SegmenterError, SlicerError};

/// Error kinds produced by the data-plane components. `IntoResponse` below
/// performs the kind→status mapping in one place for the whole HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("not connected to a required node")]
    NotConnected,
    #[error("reply deadline elapsed")]
    Timeout,
    #[error("node rejected the request: {0}")]
    RemoteError(String),
    #[error("handoff to backup nodes failed: {0}")]
    HandoffFailed(String),
    #[error("archive failed: {0}")]
    ArchiveFailed(String),
    #[error("retrieve failed: {0}")]
    RetrieveFailed(String),
    #[error("destroy failed: {0}")]
    DestroyFailed(String),
    #[error("input ended after {read} bytes, but Content-Length declared {declared}")]
    TruncatedInput { read: u64, declared: u64 },
    #[error("input has more than the declared {declared} bytes")]
    OversizedInput { declared: u64 },
    #[error("no live object found for that key")]
    NotFound,
    #[error("only {available} of {required} required nodes are connected")]
    ServiceUnavailable { available: usize, required: usize },
}

impl From<NodeClientError> for GatewayError {
    fn from(e: NodeClientError) -> Self {
        match e {
            NodeClientError::NotConnected(_) => GatewayError::NotConnected,
            NodeClientError::Timeout { .. } => GatewayError::Timeout,
            NodeClientError::Remote { message, .. } => GatewayError::RemoteError(message),
            NodeClientError::Connection { .. } => GatewayError::NotConnected,
        }
    }
}

impl From<WriteAdapterError> for GatewayError {
    fn from(e: WriteAdapterError) -> Self {
        match e {
            WriteAdapterError::Node(inner) => inner.into(),
            WriteAdapterError::HandoffFailed(inner) => GatewayError::HandoffFailed(inner.to_string()),
            WriteAdapterError::AlreadyBusy(id) => GatewayError::ArchiveFailed(format!("writer already busy with {id}")),
            WriteAdapterError::NotBusy => GatewayError::ArchiveFailed("writer has no archive in progress".to_string()),
        }
    }
}

impl From<SlicerError> for GatewayError {
    fn from(e: SlicerError) -> Self {
        match e {
            SlicerError::TruncatedInput { read, declared } => GatewayError::TruncatedInput { read, declared },
            SlicerError::OversizedInput { declared } => GatewayError::OversizedInput { declared },
            SlicerError::Io(io) => GatewayError::ArchiveFailed(io.to_string()),
        }
    }
}

impl From<SegmenterError> for GatewayError {
    fn from(e: SegmenterError) -> Self {
        GatewayError::ArchiveFailed(e.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::NotConnected | GatewayError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::TruncatedInput { .. } | GatewayError::OversizedInput { .. } => StatusCode::BAD_REQUEST,
            GatewayError::ArchiveFailed(_)
            | GatewayError::RetrieveFailed(_)
            | GatewayError::DestroyFailed(_)
            | GatewayError::Timeout
            | GatewayError::RemoteError(_)
            | GatewayError::HandoffFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
