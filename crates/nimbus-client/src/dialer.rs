use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Opens a fresh byte-stream connection to one storage node. Implemented by
/// [`TcpDialer`] in production; tests supply an in-process dialer backed by
/// `tokio::io::duplex` so the reconnect loop can be exercised without a real
/// socket.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Reader: AsyncRead + Unpin + Send + 'static;
    type Writer: AsyncWrite + Unpin + Send + 'static;

    async fn dial(&self) -> std::io::Result<(Self::Reader, Self::Writer)>;
}

/// Dials a node's address over TCP, per spec §4.1.
pub struct TcpDialer {
    pub addr: String,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Reader = tokio::net::tcp::OwnedReadHalf;
    type Writer = tokio::net::tcp::OwnedWriteHalf;

    async fn dial(&self) -> std::io::Result<(Self::Reader, Self::Writer)> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true).ok();
        Ok(stream.into_split())
    }
}
