//! Subtitle generation
//!
//! Turns the coarse, time-stamped segments produced by the speech engine into
//! short display chunks and serializes them as SubRip (`.srt`):
//! - `chunker`: re-segments transcript text and interpolates chunk timestamps
//! - `srt`: cue numbering, timestamp formatting, encoding and parsing

pub mod chunker;
pub mod srt;

use serde::{Deserialize, Serialize};

/// A time-stamped transcript segment as reported by the speech engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds, never before `start`.
    pub end: f64,
    pub text: String,
}

impl RawSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// A short display line with timestamps rounded to centiseconds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Chunk {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Chunk {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Joins chunk texts with single spaces, in order.
pub fn full_text(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
