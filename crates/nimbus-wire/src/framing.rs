use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload this framing will read before giving up on the connection.
/// Generous enough for one 1 MiB slice's worth of erasure-coded segment plus
/// header overhead; guards against a misbehaving peer claiming an enormous
/// length prefix.
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    TooLarge(u32),
    #[error("connection closed while reading a frame")]
    Eof,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed frame header: {0}")]
    Header(#[from] serde_json::Error),
}

/// Write one frame: a JSON-encoded structured header followed by an opaque
/// payload, each prefixed with its length as big-endian `u32`. Payload bytes
/// travel out-of-band from the structured header, so this doesn't commit to
/// any particular header schema.
pub async fn write_frame<W, H>(writer: &mut W, header: &H, payload: &[u8]) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
    H: Serialize,
{
    let header_bytes = serde_json::to_vec(header)?;
    if header_bytes.len() as u64 > MAX_FRAME_BYTES as u64 || payload.len() as u64 > MAX_FRAME_BYTES as u64 {
        return Err(FramingError::TooLarge(MAX_FRAME_BYTES));
    }

    writer.write_u32(header_bytes.len() as u32).await?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&header_bytes).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame written by [`write_frame`]. Returns `Err(FramingError::Eof)`
/// if the connection is closed cleanly before a new frame begins.
pub async fn read_frame<R, H>(reader: &mut R) -> Result<(H, Bytes), FramingError>
where
    R: AsyncRead + Unpin,
    H: DeserializeOwned,
{
    let header_len = match reader.read_u32().await {
        Ok(n) => n,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FramingError::Eof),
        Err(e) => return Err(e.into()),
    };
    let payload_len = reader.read_u32().await?;

    if header_len > MAX_FRAME_BYTES || payload_len > MAX_FRAME_BYTES {
        return Err(FramingError::TooLarge(header_len.max(payload_len)));
    }

    let mut header_buf = vec![0u8; header_len as usize];
    reader.read_exact(&mut header_buf).await?;
    let mut payload_buf = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload_buf).await?;

    let header: H = serde_json::from_slice(&header_buf)?;
    Ok((header, Bytes::from(payload_buf)))
}
