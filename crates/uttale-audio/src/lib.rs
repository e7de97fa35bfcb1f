//! uttale-audio
//!
//! Segment extraction: given a source audio file and a time range, produce
//! the bytes for exactly that interval. Decoding goes through the
//! [`decode::SegmentDecoder`] trait (symphonia in production), results are
//! kept in a bounded LRU cache, and concurrent identical requests share one
//! decode (single-flight).

pub mod cache;
pub mod decode;
pub mod extract;
pub mod format;
pub mod wav;

pub use cache::{SegmentCache, SegmentKey};
pub use decode::{DecodedSegment, SegmentDecoder, SymphoniaDecoder};
pub use extract::{audio_path_for, SegmentExtractor};
pub use format::SegmentFormat;
