use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use uttale_audio::{DecodedSegment, SegmentDecoder, SegmentExtractor, SegmentFormat, SymphoniaDecoder};
use uttale_core::Error;

/// Deterministic fake decoder with an instrumented decode counter.
struct CountingDecoder {
    decodes: AtomicUsize,
    duration: f64,
    delay: Duration,
    failures_left: AtomicUsize,
}

impl CountingDecoder {
    fn new(duration: f64) -> Self {
        Self {
            decodes: AtomicUsize::new(0),
            duration,
            delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing_once(self) -> Self {
        self.failures_left.store(1, Ordering::SeqCst);
        self
    }
}

impl SegmentDecoder for CountingDecoder {
    fn duration(&self, _path: &Path) -> uttale_core::Result<Option<f64>> {
        Ok(Some(self.duration))
    }

    fn decode_range(&self, _path: &Path, start: f64, end: f64) -> uttale_core::Result<DecodedSegment> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(Error::Extraction("injected decode failure".to_string()));
        }
        let n = ((end - start) * 1000.0).round() as usize;
        let samples = (0..n).map(|i| (start as f32 + i as f32) / 1.0e6).collect();
        Ok(DecodedSegment { samples, sample_rate: 1000 })
    }
}

fn fixture(counting: CountingDecoder, cache_entries: usize) -> (TempDir, Arc<CountingDecoder>, SegmentExtractor) {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(tmp.path().join("e1.ogg"), b"opaque").expect("write");
    let stats = Arc::new(counting);
    let extractor = SegmentExtractor::new(Box::new(SharedDecoder(stats.clone())), cache_entries);
    (tmp, stats, extractor)
}

/// Shares the counter with the test while the extractor owns the decoder box.
struct SharedDecoder(Arc<CountingDecoder>);

impl SegmentDecoder for SharedDecoder {
    fn duration(&self, path: &Path) -> uttale_core::Result<Option<f64>> {
        self.0.duration(path)
    }
    fn decode_range(&self, path: &Path, start: f64, end: f64) -> uttale_core::Result<DecodedSegment> {
        self.0.decode_range(path, start, end)
    }
}

#[test]
fn repeated_extraction_is_byte_identical_and_cached() {
    let (tmp, stats, extractor) = fixture(CountingDecoder::new(60.0), 8);
    let file = tmp.path().join("e1.ogg");

    let first = extractor.extract(&file, 10.0, 12.0, SegmentFormat::Wav).expect("extract");
    let second = extractor.extract(&file, 10.0, 12.0, SegmentFormat::Wav).expect("extract");
    assert_eq!(*first, *second);
    assert_eq!(stats.decodes.load(Ordering::SeqCst), 1, "second call served from cache");
    assert_eq!(extractor.cached_segments(), 1);
}

#[test]
fn invalid_ranges_are_rejected_before_any_decode() {
    let (tmp, stats, extractor) = fixture(CountingDecoder::new(60.0), 8);
    let file = tmp.path().join("e1.ogg");

    assert!(matches!(
        extractor.extract(&file, 12.0, 10.0, SegmentFormat::Wav),
        Err(Error::Range(_))
    ));
    assert!(matches!(
        extractor.extract(&file, -1.0, 2.0, SegmentFormat::Wav),
        Err(Error::Range(_))
    ));
    assert!(matches!(
        extractor.extract(&file, 5.0, 5.0, SegmentFormat::Wav),
        Err(Error::Range(_))
    ));
    assert!(matches!(
        extractor.extract(&file, 10.0, 90.0, SegmentFormat::Wav),
        Err(Error::Range(_))
    ));
    assert_eq!(stats.decodes.load(Ordering::SeqCst), 0);
}

#[test]
fn end_within_epsilon_of_duration_is_accepted() {
    let (tmp, _stats, extractor) = fixture(CountingDecoder::new(60.0), 8);
    let file = tmp.path().join("e1.ogg");
    extractor
        .extract(&file, 59.0, 60.0005, SegmentFormat::Wav)
        .expect("epsilon tolerance at the duration bound");
}

#[test]
fn missing_audio_file_is_not_found() {
    let (tmp, _stats, extractor) = fixture(CountingDecoder::new(60.0), 8);
    let file = tmp.path().join("absent.ogg");
    assert!(matches!(
        extractor.extract(&file, 0.0, 1.0, SegmentFormat::Wav),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn concurrent_identical_requests_decode_exactly_once() {
    let (tmp, stats, extractor) = fixture(
        CountingDecoder::new(60.0).with_delay(Duration::from_millis(50)),
        8,
    );
    let extractor = Arc::new(extractor);
    let file = tmp.path().join("e1.ogg");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let extractor = extractor.clone();
            let file = file.clone();
            std::thread::spawn(move || extractor.extract(&file, 3.0, 4.0, SegmentFormat::Wav))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();

    let first = results[0].as_ref().expect("extract");
    for result in &results {
        assert_eq!(**result.as_ref().expect("extract"), **first);
    }
    assert_eq!(stats.decodes.load(Ordering::SeqCst), 1, "single-flight");
}

#[test]
fn distinct_keys_decode_independently() {
    let (tmp, stats, extractor) = fixture(
        CountingDecoder::new(60.0).with_delay(Duration::from_millis(20)),
        8,
    );
    let extractor = Arc::new(extractor);
    let file = tmp.path().join("e1.ogg");

    let handles: Vec<_> = (0..4u64)
        .map(|i| {
            let extractor = extractor.clone();
            let file = file.clone();
            std::thread::spawn(move || {
                extractor.extract(&file, i as f64, i as f64 + 1.0, SegmentFormat::Wav)
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join").expect("extract");
    }
    assert_eq!(stats.decodes.load(Ordering::SeqCst), 4);
}

#[test]
fn decode_failure_is_not_cached() {
    let (tmp, stats, extractor) = fixture(CountingDecoder::new(60.0).failing_once(), 8);
    let file = tmp.path().join("e1.ogg");

    assert!(matches!(
        extractor.extract(&file, 1.0, 2.0, SegmentFormat::Wav),
        Err(Error::Extraction(_))
    ));
    assert_eq!(extractor.cached_segments(), 0, "no placeholder entry");

    extractor.extract(&file, 1.0, 2.0, SegmentFormat::Wav).expect("retry succeeds");
    assert_eq!(stats.decodes.load(Ordering::SeqCst), 2);
}

#[test]
fn lru_eviction_is_bounded_and_per_key() {
    let (tmp, stats, extractor) = fixture(CountingDecoder::new(60.0), 2);
    let file = tmp.path().join("e1.ogg");

    for i in 0..3u64 {
        extractor
            .extract(&file, i as f64, i as f64 + 1.0, SegmentFormat::Wav)
            .expect("extract");
    }
    assert_eq!(extractor.cached_segments(), 2);

    // Key 0 was evicted; extracting it again decodes a fourth time.
    extractor.extract(&file, 0.0, 1.0, SegmentFormat::Wav).expect("extract");
    assert_eq!(stats.decodes.load(Ordering::SeqCst), 4);
}

#[test]
fn symphonia_extracts_the_requested_interval_from_a_wav_file() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("tone.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
    for i in 0..8000i32 {
        let sample = ((i % 100) * 300 - 15000) as i16;
        writer.write_sample(sample).expect("write sample");
    }
    writer.finalize().expect("finalize");

    let decoder = SymphoniaDecoder;
    let duration = decoder.duration(&path).expect("duration").expect("known duration");
    assert!((duration - 1.0).abs() < 1e-6);

    let segment = decoder.decode_range(&path, 0.25, 0.5).expect("decode");
    assert_eq!(segment.sample_rate, 8000);
    let expected = 2000i64;
    assert!(
        (segment.samples.len() as i64 - expected).abs() <= 16,
        "got {} samples, expected about {expected}",
        segment.samples.len()
    );

    let extractor = SegmentExtractor::new(Box::new(SymphoniaDecoder), 4);
    let first = extractor.extract(&path, 0.25, 0.5, SegmentFormat::Wav).expect("extract");
    let second = extractor.extract(&path, 0.25, 0.5, SegmentFormat::Wav).expect("extract");
    assert_eq!(*first, *second);

    let reader = hound::WavReader::new(std::io::Cursor::new(first.as_slice())).expect("parse output");
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().sample_rate, 8000);
    assert!((reader.len() as i64 - expected).abs() <= 16);

    assert!(matches!(
        extractor.extract(&path, 0.5, 2.0, SegmentFormat::Wav),
        Err(Error::Range(_))
    ));
}
