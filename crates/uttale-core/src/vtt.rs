//! Pure WebVTT cue parser.
//!
//! `parse` turns raw transcript text into ordered [`Cue`]s. Blocks without a
//! `start --> end` timing line (the WEBVTT header, NOTE/STYLE/REGION blocks)
//! are skipped; a block with a timing line that does not parse is an error,
//! blamed on that block, and the caller decides whether to skip the file.
//! No I/O happens here.

use crate::error::{Error, Result};
use crate::timecode::parse_timecode;
use crate::types::Cue;

/// Parse a whole transcript into cues, in file order.
pub fn parse(raw: &str) -> Result<Vec<Cue>> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut cues = Vec::new();
    let mut block = 0usize;
    let mut i = 0;
    while i < lines.len() {
        if lines[i].trim().is_empty() {
            i += 1;
            continue;
        }
        block += 1;
        let block_start = i;
        while i < lines.len() && !lines[i].trim().is_empty() {
            i += 1;
        }
        // A cue block has exactly one timing line; everything after it is
        // the payload. Anything without a timing line is not a cue.
        let Some(timing) = (block_start..i).find(|&j| lines[j].contains("-->")) else {
            continue;
        };
        let (start, end) = parse_timing_line(lines[timing], block)?;
        if end <= start {
            return Err(Error::Parse {
                block,
                detail: format!("cue end {end} is not after start {start}"),
            });
        }
        let text = lines[timing + 1..i].join("\n");
        cues.push(Cue { start, end, text, index: cues.len() });
    }
    Ok(cues)
}

/// Split `HH:MM:SS.mmm --> HH:MM:SS.mmm <settings>` into seconds, ignoring
/// any cue settings after the end token.
fn parse_timing_line(line: &str, block: usize) -> Result<(f64, f64)> {
    let (lhs, rhs) = line
        .split_once("-->")
        .ok_or_else(|| Error::Parse { block, detail: format!("bad timing line: {line:?}") })?;
    let end_token = rhs
        .split_whitespace()
        .next()
        .ok_or_else(|| Error::Parse { block, detail: "timing line missing end token".into() })?;
    let start = blame(parse_timecode(lhs.trim()), block)?;
    let end = blame(parse_timecode(end_token), block)?;
    Ok((start, end))
}

fn blame(res: Result<f64>, block: usize) -> Result<f64> {
    res.map_err(|e| match e {
        Error::Parse { detail, .. } => Error::Parse { block, detail },
        other => other,
    })
}
