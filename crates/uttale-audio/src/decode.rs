//! Decoding seam and the symphonia production decoder.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::formats::{FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::debug;

use uttale_core::{Error, Result};

/// Mono PCM for one extracted interval.
pub struct DecodedSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// The decode seam. The extractor talks to this trait so tests can count
/// decodes with a fake and the codec backend stays swappable.
pub trait SegmentDecoder: Send + Sync {
    /// Total duration in seconds, if the container declares it.
    fn duration(&self, path: &Path) -> Result<Option<f64>>;

    /// Decode only the `[start, end)` interval to mono f32 samples.
    fn decode_range(&self, path: &Path, start: f64, end: f64) -> Result<DecodedSegment>;
}

fn ext_err(e: impl std::fmt::Display) -> Error {
    Error::Extraction(e.to_string())
}

/// Symphonia-backed decoder: probe the container, seek near the start of
/// the interval, decode forward, and trim to the exact sample range. The
/// whole file is never decoded.
pub struct SymphoniaDecoder;

struct OpenedTrack {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    n_frames: Option<u64>,
    time_base: Option<symphonia::core::units::TimeBase>,
}

impl SymphoniaDecoder {
    fn open(path: &Path) -> Result<OpenedTrack> {
        let src = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(src), Default::default());
        let probed = symphonia::default::get_probe()
            .format(&Hint::new(), mss, &Default::default(), &Default::default())
            .map_err(ext_err)?;
        let reader = probed.format;
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| ext_err("no supported audio tracks found"))?;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &Default::default())
            .map_err(|_| ext_err("unsupported codec"))?;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| ext_err("could not determine sample rate"))?;
        Ok(OpenedTrack {
            track_id: track.id,
            sample_rate,
            n_frames: track.codec_params.n_frames,
            time_base: track.codec_params.time_base,
            decoder,
            reader,
        })
    }
}

impl SegmentDecoder for SymphoniaDecoder {
    fn duration(&self, path: &Path) -> Result<Option<f64>> {
        let opened = Self::open(path)?;
        Ok(opened
            .n_frames
            .map(|frames| frames as f64 / f64::from(opened.sample_rate)))
    }

    fn decode_range(&self, path: &Path, start: f64, end: f64) -> Result<DecodedSegment> {
        let mut opened = Self::open(path)?;
        let sample_rate = opened.sample_rate;
        let start_frame = (start * f64::from(sample_rate)).round() as u64;
        let end_frame = (end * f64::from(sample_rate)).round() as u64;

        // Coarse seek lands at or before the interval; trimming below makes
        // the cut exact.
        let seeked = opened.reader.seek(
            SeekMode::Coarse,
            SeekTo::Time { time: Time::from(start.max(0.0)), track_id: Some(opened.track_id) },
        );
        if let Err(e) = &seeked {
            debug!(error = %e, "seek failed, decoding from the stream head");
        }

        let mut samples: Vec<f32> = Vec::with_capacity((end_frame - start_frame) as usize);
        let mut cursor: Option<u64> = seeked.ok().map(|s| s.actual_ts);
        loop {
            let packet = match opened.reader.next_packet() {
                Ok(p) => p,
                Err(_) => break, // end of stream
            };
            if packet.track_id() != opened.track_id {
                continue;
            }
            let packet_frame = match opened.time_base {
                Some(tb) => {
                    let t = tb.calc_time(packet.ts());
                    ((t.seconds as f64 + t.frac) * f64::from(sample_rate)).round() as u64
                }
                None => cursor.unwrap_or(0),
            };
            let decoded = opened.decoder.decode(&packet).map_err(ext_err)?;
            let frames = decoded.frames() as u64;
            cursor = Some(packet_frame + frames);

            if packet_frame >= end_frame {
                break;
            }
            if packet_frame + frames <= start_frame {
                continue;
            }
            let skip = start_frame.saturating_sub(packet_frame) as usize;
            let take = (end_frame.min(packet_frame + frames) - packet_frame) as usize;
            append_channel0(&mut samples, &decoded, skip, take);
            if packet_frame + frames >= end_frame {
                break;
            }
        }

        if samples.is_empty() {
            return Err(ext_err(format!(
                "no audio decoded for {start:.3}-{end:.3} in {}",
                path.display()
            )));
        }
        Ok(DecodedSegment { samples, sample_rate })
    }
}

fn conv<T>(out: &mut Vec<f32>, buf: &symphonia::core::audio::AudioBuffer<T>, skip: usize, take: usize)
where
    T: symphonia::core::sample::Sample,
    f32: FromSample<T>,
{
    out.extend(buf.chan(0)[skip..take].iter().map(|v| f32::from_sample(*v)));
}

/// Push channel 0 frames `skip..take` of the decoded buffer as f32.
fn append_channel0(out: &mut Vec<f32>, decoded: &AudioBufferRef<'_>, skip: usize, take: usize) {
    match decoded {
        AudioBufferRef::F32(buf) => out.extend(&buf.chan(0)[skip..take]),
        AudioBufferRef::U8(data) => conv(out, data, skip, take),
        AudioBufferRef::U16(data) => conv(out, data, skip, take),
        AudioBufferRef::U24(data) => conv(out, data, skip, take),
        AudioBufferRef::U32(data) => conv(out, data, skip, take),
        AudioBufferRef::S8(data) => conv(out, data, skip, take),
        AudioBufferRef::S16(data) => conv(out, data, skip, take),
        AudioBufferRef::S24(data) => conv(out, data, skip, take),
        AudioBufferRef::S32(data) => conv(out, data, skip, take),
        AudioBufferRef::F64(data) => conv(out, data, skip, take),
    }
}
