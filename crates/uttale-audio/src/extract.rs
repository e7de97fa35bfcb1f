use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use uttale_core::timecode::to_millis;
use uttale_core::{Error, Result};

use crate::cache::{SegmentCache, SegmentKey};
use crate::decode::SegmentDecoder;
use crate::format::SegmentFormat;
use crate::wav::encode_wav_mono16;

/// Floating-point slack accepted at the file-duration bound.
pub const RANGE_EPSILON: f64 = 1e-3;

/// Extracts and caches exact audio intervals. The decoder is a trait object
/// so the codec backend (and test instrumentation) plugs in at construction.
pub struct SegmentExtractor {
    decoder: Box<dyn SegmentDecoder>,
    cache: SegmentCache,
}

impl SegmentExtractor {
    pub fn new(decoder: Box<dyn SegmentDecoder>, cache_entries: usize) -> Self {
        Self { decoder, cache: SegmentCache::new(cache_entries) }
    }

    /// Bytes for `[start, end)` of `file` in `format`. Repeated calls with
    /// the same arguments return the same buffer, the second one without
    /// touching the file.
    pub fn extract(
        &self,
        file: &Path,
        start: f64,
        end: f64,
        format: SegmentFormat,
    ) -> Result<Arc<Vec<u8>>> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(Error::Range(format!(
                "need 0 <= start < end, got start={start} end={end}"
            )));
        }
        let key = SegmentKey {
            file: file.to_string_lossy().into_owned(),
            start_ms: to_millis(start),
            end_ms: to_millis(end),
            format,
        };
        if let Some(hit) = self.cache.get(&key) {
            debug!(file = %key.file, "segment served from cache");
            return Ok(hit);
        }
        if !file.is_file() {
            return Err(Error::NotFound(format!("audio file {}", file.display())));
        }
        if let Some(duration) = self.decoder.duration(file)? {
            if end > duration + RANGE_EPSILON {
                return Err(Error::Range(format!(
                    "end={end} beyond file duration {duration:.3}"
                )));
            }
        }
        self.cache.get_or_compute(key, || {
            let segment = self.decoder.decode_range(file, start, end)?;
            match format {
                SegmentFormat::Wav => encode_wav_mono16(&segment),
            }
        })
    }

    pub fn cached_segments(&self) -> usize {
        self.cache.len()
    }
}

/// Audio counterpart of a transcript: same relative path with the audio
/// extension, under the corpus root.
pub fn audio_path_for(corpus_root: &Path, transcript_rel: &str, audio_ext: &str) -> PathBuf {
    corpus_root.join(Path::new(transcript_rel).with_extension(audio_ext))
}
