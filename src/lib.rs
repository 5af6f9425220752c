//! Whisper transcription service producing short-line SubRip subtitles.
//!
//! Uploaded audio is transcribed by a [`engine::SpeechEngine`], re-segmented
//! into chunks of a few words by [`subtitle::chunker`] and written as `.srt`
//! by [`subtitle::srt`].

pub mod audio;
pub mod cli;
pub mod client;
pub mod config;
pub mod dto;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod subtitle;
pub mod whisper;
