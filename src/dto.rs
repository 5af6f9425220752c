use crate::pipeline::TranscriptResult;
use crate::subtitle::Chunk;

#[derive(serde::Serialize)]
pub struct TranscriptionDto {
    pub text: String,
    pub language: String,
    pub segments: Vec<TranscriptionSegment>,
    pub srt_file_url: String,
}

#[derive(serde::Serialize)]
pub struct TranscriptionSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl From<&Chunk> for TranscriptionSegment {
    fn from(chunk: &Chunk) -> Self {
        Self {
            start: chunk.start,
            end: chunk.end,
            text: chunk.text.clone(),
        }
    }
}

impl TranscriptionDto {
    pub fn new(result: &TranscriptResult, srt_file_url: String) -> Self {
        Self {
            text: result.full_text.clone(),
            language: result.language.clone(),
            segments: result.chunks.iter().map(TranscriptionSegment::from).collect(),
            srt_file_url,
        }
    }
}
