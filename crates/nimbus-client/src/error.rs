use std::time::Duration;

use nimbus_wire::ResultCode;

#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeClientError {
    #[error("not connected to {0}")]
    NotConnected(String),
    #[error("request to {node} timed out after {elapsed:?}")]
    Timeout { node: String, elapsed: Duration },
    #[error("{node} rejected the request ({code:?}): {message}")]
    Remote {
        node: String,
        code: ResultCode,
        message: String,
    },
    #[error("connection to {node} failed: {message}")]
    Connection { node: String, message: String },
}
