use std::path::PathBuf;

use anyhow::Result;

use crate::audio::PcmFormat;
use crate::subtitle::RawSegment;

/// What the speech engine is asked to transcribe.
#[derive(Clone, Debug)]
pub struct EngineRequest {
    pub audio_path: PathBuf,
    pub word_timestamps: bool,
    /// Raw PCM layout described by the client, if any.
    pub pcm_format: Option<PcmFormat>,
}

impl EngineRequest {
    pub fn new(audio_path: impl Into<PathBuf>) -> Self {
        Self {
            audio_path: audio_path.into(),
            word_timestamps: true,
            pcm_format: None,
        }
    }
}

/// Full transcript as reported by the engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineTranscript {
    pub text: String,
    /// Detected (or forced) language code.
    pub language: String,
    pub segments: Vec<RawSegment>,
}

/// A loaded speech-to-text model. Calls block until inference completes.
pub trait SpeechEngine: Send + Sync {
    fn transcribe(&self, request: &EngineRequest) -> Result<EngineTranscript>;
}
