//! Re-segments engine output into short display chunks.
//!
//! Each engine segment is split into lines, and the segment's time span is
//! divided evenly between them. Chunk timestamps are rounded to centiseconds,
//! so adjacent chunks may leave sub-centisecond gaps; those are kept as-is.

use std::fmt;
use std::str::FromStr;

use log::debug;

use super::{Chunk, RawSegment};
use crate::error::SubtitleError;

/// Average characters per word used by the character-budget policy.
pub const CHARS_PER_WORD: usize = 10;

/// How a segment's text is broken into display lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChunkPolicy {
    /// Greedy word wrap at `max_words * CHARS_PER_WORD` characters.
    #[default]
    CharacterBudget,
    /// At most `max_words` words per line.
    WordCount,
}

impl FromStr for ChunkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chars" | "characters" | "character-budget" => Ok(ChunkPolicy::CharacterBudget),
            "words" | "word-count" => Ok(ChunkPolicy::WordCount),
            other => Err(format!(
                "Unknown chunk policy '{other}' (expected 'chars' or 'words')"
            )),
        }
    }
}

impl fmt::Display for ChunkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkPolicy::CharacterBudget => write!(f, "chars"),
            ChunkPolicy::WordCount => write!(f, "words"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkOptions {
    pub max_words: usize,
    pub policy: ChunkPolicy,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_words: 3,
            policy: ChunkPolicy::default(),
        }
    }
}

impl ChunkOptions {
    /// Line width in characters for the character-budget policy.
    pub fn line_width(&self) -> usize {
        self.max_words.saturating_mul(CHARS_PER_WORD)
    }
}

/// Splits every segment into chunks, preserving segment order.
///
/// Segments whose text holds no words contribute nothing. A segment that ends
/// before it starts, starts before zero, or carries non-finite times is
/// rejected with [`SubtitleError::InvalidSegment`].
pub fn chunk_segments(
    segments: &[RawSegment],
    options: &ChunkOptions,
) -> Result<Vec<Chunk>, SubtitleError> {
    if options.max_words == 0 {
        return Err(SubtitleError::InvalidMaxWords);
    }

    if segments.is_empty() {
        debug!("No segments to chunk");
        return Ok(Vec::new());
    }

    let mut chunks = Vec::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        validate_segment(index, segment)?;

        let lines = split_lines(&segment.text, options);
        if lines.is_empty() {
            debug!("Segment #{index} has no words, skipping");
            continue;
        }

        let per_chunk = (segment.end - segment.start) / lines.len() as f64;
        for (i, text) in lines.into_iter().enumerate() {
            chunks.push(Chunk {
                start: round_centis(segment.start + i as f64 * per_chunk),
                end: round_centis(segment.start + (i + 1) as f64 * per_chunk),
                text,
            });
        }
    }

    debug!(
        "Split {} segments into {} chunks ({}, max_words={})",
        segments.len(),
        chunks.len(),
        options.policy,
        options.max_words
    );
    Ok(chunks)
}

fn validate_segment(index: usize, segment: &RawSegment) -> Result<(), SubtitleError> {
    let valid = segment.start.is_finite()
        && segment.end.is_finite()
        && segment.start >= 0.0
        && segment.end >= segment.start;

    if valid {
        Ok(())
    } else {
        Err(SubtitleError::InvalidSegment {
            index,
            start: segment.start,
            end: segment.end,
        })
    }
}

/// Breaks text into display lines according to `options.policy`.
pub fn split_lines(text: &str, options: &ChunkOptions) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    match options.policy {
        ChunkPolicy::CharacterBudget => wrap_words(&words, options.line_width()),
        ChunkPolicy::WordCount => words
            .chunks(options.max_words.max(1))
            .map(|group| group.join(" "))
            .collect(),
    }
}

// Words wider than `width` get a line of their own and are never split.
fn wrap_words(words: &[&str], width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_len = 0;

    for word in words {
        let word_len = word.chars().count();
        if line_len > 0 && line_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut line));
            line_len = 0;
        }
        if line_len > 0 {
            line.push(' ');
            line_len += 1;
        }
        line.push_str(word);
        line_len += word_len;
    }

    if line_len > 0 {
        lines.push(line);
    }
    lines
}

/// Rounds to two decimals, ties to even on the exact binary value.
pub fn round_centis(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}
