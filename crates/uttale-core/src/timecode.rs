//! `HH:MM:SS.mmm` timecode arithmetic.
//!
//! Parsing and formatting round-trip exactly for well-formed tokens, so a
//! cue's original timecode can always be reconstructed from its fractional
//! seconds.

use crate::error::{Error, Result};

/// Convert an `HH:MM:SS.mmm` token to fractional seconds.
pub fn parse_timecode(token: &str) -> Result<f64> {
    let bad = |detail: &str| Error::Parse { block: 0, detail: format!("{detail}: {token:?}") };

    let mut parts = token.trim().split(':');
    let (h, m, rest) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), Some(rest), None) => (h, m, rest),
        _ => return Err(bad("expected HH:MM:SS.mmm")),
    };
    let (s, ms) = rest
        .split_once('.')
        .ok_or_else(|| bad("missing millisecond separator"))?;
    if ms.len() != 3 {
        return Err(bad("milliseconds must be three digits"));
    }
    let h: u64 = h.parse().map_err(|_| bad("bad hours"))?;
    let m: u64 = m.parse().map_err(|_| bad("bad minutes"))?;
    let s: u64 = s.parse().map_err(|_| bad("bad seconds"))?;
    let ms: u64 = ms.parse().map_err(|_| bad("bad milliseconds"))?;
    if m >= 60 || s >= 60 {
        return Err(bad("minutes and seconds must be < 60"));
    }
    Ok((h * 3600 + m * 60 + s) as f64 + ms as f64 / 1000.0)
}

/// Render fractional seconds as `HH:MM:SS.mmm`, rounding to the millisecond.
pub fn format_timecode(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    let s = total_s % 60;
    let m = (total_s / 60) % 60;
    let h = total_s / 3600;
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

/// Whole milliseconds, the hashable form used for cache keys.
pub fn to_millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}
