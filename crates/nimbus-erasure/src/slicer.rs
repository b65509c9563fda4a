use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default slice size: 1 MiB (spec §4.3).
pub const DEFAULT_SLICE_SIZE: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SlicerError {
    #[error("input ended after {read} bytes, but Content-Length declared {declared}")]
    TruncatedInput { read: u64, declared: u64 },
    #[error("input has more than the declared {declared} bytes")]
    OversizedInput { declared: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Lazily chunks a byte stream into fixed-size slices, per spec §4.3.
///
/// Pulls from the underlying reader only as `next_slice` is polled, so a slow
/// or backpressured consumer (the [`Archiver`](../nimbus_gateway)) never
/// forces more than one slice's worth of buffering.
pub struct Slicer<R> {
    reader: R,
    declared_len: u64,
    bytes_read: u64,
    slice_size: usize,
    finished: bool,
}

impl<R: AsyncRead + Unpin> Slicer<R> {
    pub fn new(reader: R, declared_len: u64) -> Self {
        Self::with_slice_size(reader, declared_len, DEFAULT_SLICE_SIZE)
    }

    pub fn with_slice_size(reader: R, declared_len: u64, slice_size: usize) -> Self {
        Self {
            reader,
            declared_len,
            bytes_read: 0,
            slice_size,
            finished: false,
        }
    }

    /// Total bytes declared for this stream (the `Content-Length`).
    pub fn declared_len(&self) -> u64 {
        self.declared_len
    }

    /// Pull the next slice. Returns `Ok(None)` once the final (possibly
    /// empty) slice has already been returned.
    ///
    /// Every slice is exactly `slice_size` bytes except the last, which is
    /// short or empty. If `declared_len` is an exact multiple of
    /// `slice_size`, the last few full-size chunks are still followed by one
    /// more, empty, final chunk — the Archiver relies on there always being a
    /// distinct last slice to carry `archive-key-final`'s totals.
    pub async fn next_slice(&mut self) -> Result<Option<Bytes>, SlicerError> {
        if self.finished {
            return Ok(None);
        }

        let remaining = self.declared_len - self.bytes_read;
        let want = remaining.min(self.slice_size as u64) as usize;

        let mut buf = vec![0u8; want];
        if want > 0 {
            self.reader.read_exact(&mut buf).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    // `read_exact` doesn't report how many of `want` bytes it
                    // actually got before hitting EOF, so `read` undercounts
                    // by up to one partial slice.
                    SlicerError::TruncatedInput {
                        read: self.bytes_read,
                        declared: self.declared_len,
                    }
                } else {
                    SlicerError::Io(e)
                }
            })?;
        }
        self.bytes_read += want as u64;

        // A full-size chunk might not be the last one; only a short or empty
        // chunk (want < slice_size) proves `remaining` hit zero.
        if want < self.slice_size {
            self.finished = true;
            // Exactly one byte is enough to prove the stream carries more
            // than it declared.
            let mut probe = [0u8; 1];
            match self.reader.read(&mut probe).await {
                Ok(0) => {}
                Ok(_) => {
                    return Err(SlicerError::OversizedInput {
                        declared: self.declared_len,
                    })
                }
                Err(e) => return Err(SlicerError::Io(e)),
            }
        }

        Ok(Some(Bytes::from(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn chunks_into_fixed_size_slices_with_short_tail() {
        let data = vec![7u8; DEFAULT_SLICE_SIZE * 2 + 123];
        let mut slicer = Slicer::new(Cursor::new(data.clone()), data.len() as u64);

        let first = slicer.next_slice().await.unwrap().unwrap();
        let second = slicer.next_slice().await.unwrap().unwrap();
        let third = slicer.next_slice().await.unwrap().unwrap();
        let fourth = slicer.next_slice().await.unwrap();

        assert_eq!(first.len(), DEFAULT_SLICE_SIZE);
        assert_eq!(second.len(), DEFAULT_SLICE_SIZE);
        assert_eq!(third.len(), 123);
        assert!(fourth.is_none());
    }

    #[tokio::test]
    async fn exact_multiple_of_slice_size_still_ends_in_an_empty_slice() {
        let data = vec![9u8; DEFAULT_SLICE_SIZE * 2];
        let mut slicer = Slicer::new(Cursor::new(data), (DEFAULT_SLICE_SIZE * 2) as u64);

        let first = slicer.next_slice().await.unwrap().unwrap();
        let second = slicer.next_slice().await.unwrap().unwrap();
        let third = slicer.next_slice().await.unwrap().unwrap();
        let fourth = slicer.next_slice().await.unwrap();

        assert_eq!(first.len(), DEFAULT_SLICE_SIZE);
        assert_eq!(second.len(), DEFAULT_SLICE_SIZE);
        assert!(third.is_empty());
        assert!(fourth.is_none());
    }

    #[tokio::test]
    async fn empty_input_yields_one_empty_slice() {
        let mut slicer = Slicer::new(Cursor::new(Vec::new()), 0);
        let only = slicer.next_slice().await.unwrap().unwrap();
        assert!(only.is_empty());
        assert!(slicer.next_slice().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_input_is_an_error() {
        let mut slicer = Slicer::new(Cursor::new(vec![1u8; 10]), 20);
        let err = slicer.next_slice().await.unwrap_err();
        assert!(matches!(err, SlicerError::TruncatedInput { declared: 20, .. }));
    }

    #[tokio::test]
    async fn oversized_input_is_an_error() {
        let mut slicer = Slicer::new(Cursor::new(vec![1u8; 20]), 10);
        let err = slicer.next_slice().await.unwrap_err();
        assert!(matches!(err, SlicerError::OversizedInput { declared: 10 }));
    }
}
