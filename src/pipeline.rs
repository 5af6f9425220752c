//! Runs one upload through engine, chunker and encoder.

use std::path::{Path, PathBuf};

use log::{debug, error, info};

use crate::engine::{EngineRequest, SpeechEngine};
use crate::error::TranscribeError;
use crate::subtitle::chunker::{ChunkOptions, chunk_segments};
use crate::subtitle::{Chunk, full_text, srt};

/// Outcome of a transcription request.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptResult {
    /// Chunk texts joined by single spaces.
    pub full_text: String,
    pub language: String,
    pub chunks: Vec<Chunk>,
    pub subtitle_path: PathBuf,
}

impl TranscriptResult {
    pub fn subtitle_file_name(&self) -> Option<&str> {
        self.subtitle_path.file_name().and_then(|name| name.to_str())
    }
}

/// The subtitle file lives next to the audio, with an `.srt` extension.
pub fn subtitle_path_for(audio_path: &Path) -> PathBuf {
    audio_path.with_extension("srt")
}

pub fn transcribe_file(
    engine: &dyn SpeechEngine,
    request: &EngineRequest,
    options: &ChunkOptions,
) -> Result<TranscriptResult, TranscribeError> {
    info!("Transcription started for file: {}", request.audio_path.display());

    let request = EngineRequest {
        word_timestamps: true,
        ..request.clone()
    };
    let transcript = engine.transcribe(&request).map_err(|e| {
        error!("Speech engine failed: {e:#}");
        TranscribeError::Engine(e)
    })?;
    info!(
        "Speech engine finished: {} segments, language={}",
        transcript.segments.len(),
        transcript.language
    );

    if transcript.segments.is_empty() {
        debug!("Engine returned no segments, subtitle file will be empty");
    }

    let chunks = chunk_segments(&transcript.segments, options)?;
    info!("Split transcript into {} chunks", chunks.len());

    let subtitle_path = subtitle_path_for(&request.audio_path);
    srt::encode_to_file(&chunks, &subtitle_path)?;
    info!("Subtitle file written: {}", subtitle_path.display());

    Ok(TranscriptResult {
        full_text: full_text(&chunks),
        language: transcript.language,
        chunks,
        subtitle_path,
    })
}
