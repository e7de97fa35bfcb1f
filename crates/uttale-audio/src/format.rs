use uttale_core::{Error, Result};

/// Output encoding of an extracted segment. Decoded intervals are rendered
/// as mono PCM; `Wav` is the one supported container today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentFormat {
    Wav,
}

impl SegmentFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "wav" => Ok(Self::Wav),
            other => Err(Error::InvalidQuery(format!("unsupported audio format {other:?}"))),
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Wav => "wav",
        }
    }
}
