//! whisper.cpp backed speech engine.

pub mod config;
pub mod resampler;
pub mod transcriber;

pub use config::WhisperConfig;
pub use transcriber::SimpleTranscriber;
