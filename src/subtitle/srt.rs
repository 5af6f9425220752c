//! SubRip (`.srt`) encoding and parsing.
//!
//! A cue block is the 1-based cue number, a `start --> end` timing line, the
//! text and a terminating blank line. Files are UTF-8 with `\n` line endings.

use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;

use super::Chunk;
use crate::error::SubtitleError;

/// MIME type used when serving generated subtitle files.
pub const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Serialization view of a chunk: its position and timing within the file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cue<'a> {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: &'a str,
}

impl fmt::Display for Cue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} --> {}\n{}\n\n",
            self.index,
            format_timestamp(self.start),
            format_timestamp(self.end),
            self.text
        )
    }
}

/// Numbers chunks as cues, starting at 1.
pub fn cues(chunks: &[Chunk]) -> impl Iterator<Item = Cue<'_>> {
    chunks.iter().enumerate().map(|(i, chunk)| Cue {
        index: i + 1,
        start: chunk.start,
        end: chunk.end,
        text: &chunk.text,
    })
}

/// Encodes chunks as SubRip text. No chunks, no cues: the result is empty.
pub fn encode(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for cue in cues(chunks) {
        // Writing into a String cannot fail.
        let _ = write!(out, "{cue}");
    }
    out
}

/// Writes the encoded cues to `destination`, replacing any existing file.
///
/// The file handle is flushed before returning and closed on every path.
pub fn encode_to_file(chunks: &[Chunk], destination: &Path) -> Result<(), SubtitleError> {
    debug!(
        "Writing {} cues to {}",
        chunks.len(),
        destination.display()
    );

    let to_error = |source: std::io::Error| SubtitleError::Encoding {
        path: destination.to_path_buf(),
        source,
    };

    let file = File::create(destination).map_err(to_error)?;
    let mut writer = BufWriter::new(file);
    for cue in cues(chunks) {
        write!(writer, "{cue}").map_err(to_error)?;
    }
    writer.flush().map_err(to_error)?;
    Ok(())
}

/// Formats seconds as `HH:MM:SS,mmm`. Hours are not capped at 24.
///
/// Milliseconds are the truncated fractional part, so `1.15` renders as
/// `00:00:01,149`. Negative or non-finite input renders as zero.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    };

    let millis = (((seconds % 1.0) * 1000.0).floor() as u64).min(999);
    let whole = seconds.floor() as u64;
    let hours = whole / 3600;
    let minutes = (whole % 3600) / 60;
    let secs = whole % 60;

    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}

/// Parses `HH:MM:SS,mmm` (a `.` separator is accepted too) into seconds.
pub fn parse_timestamp(text: &str) -> Option<f64> {
    let (clock, millis) = text.trim().split_once([',', '.'])?;
    let mut parts = clock.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let secs: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || secs >= 60 || millis.len() != 3 {
        return None;
    }
    let millis: u64 = millis.parse().ok()?;

    let total_millis = ((hours * 3600 + minutes * 60 + secs) * 1000) + millis;
    Some(total_millis as f64 / 1000.0)
}

/// A cue read back from SubRip text.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedCue {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Parses SubRip text into cues. Multi-line cue text is joined with `\n`.
pub fn parse(input: &str) -> Result<Vec<ParsedCue>, SubtitleError> {
    let mut cues = Vec::new();
    let mut lines = input.lines().enumerate().peekable();

    loop {
        while let Some(&(_, line)) = lines.peek() {
            if !line.trim().is_empty() {
                break;
            }
            lines.next();
        }

        let Some((number_at, number_line)) = lines.next() else {
            break;
        };
        let index = number_line
            .trim()
            .trim_start_matches('\u{feff}')
            .parse::<usize>()
            .map_err(|_| {
                parse_error(number_at, format!("expected cue number, found '{number_line}'"))
            })?;

        let (timing_at, timing_line) = lines
            .next()
            .ok_or_else(|| parse_error(number_at + 1, "missing timing line".to_string()))?;
        let (start, end) = timing_line
            .split_once("-->")
            .ok_or_else(|| parse_error(timing_at, format!("expected timing, found '{timing_line}'")))?;
        let start = parse_timestamp(start)
            .ok_or_else(|| parse_error(timing_at, format!("invalid start time '{}'", start.trim())))?;
        let end = parse_timestamp(end)
            .ok_or_else(|| parse_error(timing_at, format!("invalid end time '{}'", end.trim())))?;

        let mut text = Vec::new();
        while let Some(&(_, line)) = lines.peek() {
            if line.trim().is_empty() {
                break;
            }
            text.push(line);
            lines.next();
        }

        cues.push(ParsedCue {
            index,
            start,
            end,
            text: text.join("\n"),
        });
    }

    Ok(cues)
}

fn parse_error(zero_based_line: usize, reason: String) -> SubtitleError {
    SubtitleError::Parse {
        line: zero_based_line + 1,
        reason,
    }
}
