//! Domain types, error taxonomy, configuration, and the WebVTT cue parser.
//!
//! Everything here is pure (no index, no audio, no network) so the other
//! crates can depend on it without pulling in their backends.
#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod timecode;
pub mod types;
pub mod vtt;

pub use error::{Error, Result};
