use std::io::Cursor;

use uttale_core::{Error, Result};

use crate::decode::DecodedSegment;

/// Encode a decoded segment as a mono 16-bit PCM WAV byte buffer.
pub fn encode_wav_mono16(segment: &DecodedSegment) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: segment.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Extraction(e.to_string()))?;
        for &sample in &segment.samples {
            let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer
                .write_sample(quantized)
                .map_err(|e| Error::Extraction(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Extraction(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}
