use std::path::PathBuf;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

use crate::audio::Container;

/// Errors raised by the chunker and the SubRip encoder/parser.
#[derive(Error, Debug)]
pub enum SubtitleError {
    #[error("Invalid segment #{index}: start={start}, end={end}")]
    InvalidSegment { index: usize, start: f64, end: f64 },

    #[error("max_words must be at least 1")]
    InvalidMaxWords,

    #[error("Failed to write subtitle file {}: {source}", .path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed subtitle at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Errors raised while turning uploaded bytes into f32 samples.
#[derive(Error, Debug, PartialEq)]
pub enum AudioError {
    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),

    #[error("Invalid {bit_depth}-bit audio data: byte count ({len}) not divisible by {width}")]
    Misaligned { bit_depth: u8, len: usize, width: usize },

    #[error("Failed to decode WAV data: {0}")]
    Wav(String),

    #[error("Invalid channel count: {0}")]
    InvalidChannels(usize),

    #[error("No audio data provided")]
    Empty,

    #[error("{0} data is not raw PCM")]
    Compressed(Container),

    #[error("No audio stream found")]
    NoAudioStream,

    #[error("Failed to decode audio: {0}")]
    Ffmpeg(String),
}

/// Errors surfaced by the transcription pipeline and the HTTP layer.
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Transcription failed: {0}")]
    Engine(#[source] anyhow::Error),

    #[error(transparent)]
    Subtitle(#[from] SubtitleError),

    #[error("{0}")]
    Upload(String),

    #[error("Upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResponseError for TranscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            TranscribeError::Upload(_) => StatusCode::BAD_REQUEST,
            TranscribeError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}
