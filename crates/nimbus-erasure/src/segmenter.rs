use bytes::Bytes;
use reed_solomon_erasure::galois_8::ReedSolomon;
use std::collections::BTreeMap;

/// Pure k-of-n erasure coder (spec §4.2). `encode` never touches I/O;
/// `decode` requires only that at least `k` of the `n` segments it was given
/// are genuine outputs of a matching `encode` call, keyed by their original,
/// 1-indexed segment number.
#[derive(Clone)]
pub struct Segmenter {
    k: usize,
    n: usize,
    codec: ReedSolomon,
}

#[derive(Debug, thiserror::Error)]
pub enum SegmenterError {
    #[error("k ({k}) must be at least 1 and no greater than n ({n})")]
    InvalidShape { k: usize, n: usize },
    #[error("decode requires at least {required} segments, got {actual}")]
    NotEnoughSegments { required: usize, actual: usize },
    #[error("segment number {0} is out of range for this cluster")]
    SegmentOutOfRange(u32),
    #[error("segments are not all the same length")]
    MismatchedSegmentLength,
    #[error(transparent)]
    Codec(#[from] reed_solomon_erasure::Error),
}

impl Segmenter {
    /// Construct a coder for `k` data shards and `n` total shards (`n - k`
    /// parity shards). `k` is fixed per cluster; changing it requires a
    /// read-side migration (spec §4.2).
    pub fn new(k: usize, n: usize) -> Result<Self, SegmenterError> {
        if k == 0 || k > n {
            return Err(SegmenterError::InvalidShape { k, n });
        }
        let codec = ReedSolomon::new(k, n - k)?;
        Ok(Self { k, n, codec })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Encode `data` into exactly `n` segments. Segment `i` (0-indexed here,
    /// 1-indexed as `segment_num` on the wire) is always the same length:
    /// `ceil(data.len() / k)`, with the final data shard zero-padded to that
    /// length.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<Bytes>, SegmenterError> {
        if data.is_empty() {
            // A degenerate but legitimate input (spec §4.6's "empty final
            // slice"): there is nothing to spread across shards, so every
            // segment is the empty segment and no coding work is needed.
            return Ok(vec![Bytes::new(); self.n]);
        }

        let shard_len = data.len().div_ceil(self.k);
        let mut shards: Vec<Vec<u8>> = Vec::with_capacity(self.n);
        for chunk_start in (0..self.k * shard_len).step_by(shard_len) {
            let mut shard = vec![0u8; shard_len];
            let end = (chunk_start + shard_len).min(data.len());
            if chunk_start < data.len() {
                shard[..end - chunk_start].copy_from_slice(&data[chunk_start..end]);
            }
            shards.push(shard);
        }
        for _ in self.k..self.n {
            shards.push(vec![0u8; shard_len]);
        }

        self.codec.encode(&mut shards)?;

        Ok(shards.into_iter().map(Bytes::from).collect())
    }

    /// Reconstruct the padded plaintext from any `k` of the `n` segments,
    /// keyed by their original 1-indexed segment number. The result is
    /// `k * shard_len` bytes; callers trim it to the object's recorded total
    /// size (the padding added by `encode` is otherwise indistinguishable
    /// from real trailing zero bytes).
    pub fn decode(&self, segments: &BTreeMap<u32, Bytes>) -> Result<Bytes, SegmenterError> {
        if segments.len() < self.k {
            return Err(SegmenterError::NotEnoughSegments {
                required: self.k,
                actual: segments.len(),
            });
        }

        let shard_len = match segments.values().next() {
            Some(first) => first.len(),
            None => return Ok(Bytes::new()),
        };
        if shard_len == 0 {
            return Ok(Bytes::new());
        }
        if segments.values().any(|s| s.len() != shard_len) {
            return Err(SegmenterError::MismatchedSegmentLength);
        }

        let mut shards: Vec<Option<Vec<u8>>> = vec![None; self.n];
        for (&segment_num, bytes) in segments {
            let idx = segment_num
                .checked_sub(1)
                .filter(|&i| (i as usize) < self.n)
                .ok_or(SegmenterError::SegmentOutOfRange(segment_num))? as usize;
            shards[idx] = Some(bytes.to_vec());
        }

        self.codec.reconstruct_data(&mut shards)?;

        let mut out = Vec::with_capacity(self.k * shard_len);
        for shard in shards.into_iter().take(self.k) {
            out.extend_from_slice(&shard.expect("reconstruct_data fills every data shard"));
        }
        Ok(Bytes::from(out))
    }
}
