//! Pure, I/O-free erasure coding and payload slicing (spec §4.2, §4.3).

mod segmenter;
mod slicer;

pub use segmenter::{Segmenter, SegmenterError};
pub use slicer::{Slicer, SlicerError, DEFAULT_SLICE_SIZE};
