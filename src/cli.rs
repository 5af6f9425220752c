use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ResponseFormat;
use crate::subtitle::chunker::ChunkPolicy;

#[derive(Parser)]
#[command(
    name = "srt-transcribe",
    about = "Transcribe audio into short-line SubRip subtitles",
    long_about = "Runs a Whisper transcription server that turns uploaded audio into .srt subtitles with at most a few words per cue, or uploads a file to such a server.",
    after_help = "EXAMPLES:\n    # Start the server (WHISPER_MODEL_PATH must point at a ggml model)\n    srt-transcribe serve\n\n    # Use exact three-word cues and answer with JSON by default\n    srt-transcribe serve --chunk-policy words --response-format json\n\n    # Transcribe a file and save talk.srt next to it\n    srt-transcribe file talk.wav\n\n    # Print the JSON summary instead\n    srt-transcribe file talk.wav --json --server-url http://my-server:8080"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(name = "serve")]
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value = "8080")]
        port: u16,

        /// Overrides WHISPER_MODEL_PATH
        #[arg(long)]
        model_path: Option<PathBuf>,

        /// Overrides UPLOAD_DIR
        #[arg(long)]
        upload_dir: Option<PathBuf>,

        /// Overrides MAX_WORDS
        #[arg(long, value_parser = validate_max_words)]
        max_words: Option<usize>,

        /// `chars` (30 characters per 3 words) or `words`; overrides CHUNK_POLICY
        #[arg(long)]
        chunk_policy: Option<ChunkPolicy>,

        /// `srt` or `json`; overrides RESPONSE_FORMAT
        #[arg(long)]
        response_format: Option<ResponseFormat>,
    },
    #[command(name = "file")]
    TranscribeFile {
        audio_file: PathBuf,

        #[arg(long, default_value = "http://localhost:8080")]
        server_url: String,

        /// Where to save the subtitles (default: next to the audio file)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Print the JSON summary instead of saving the subtitle file
        #[arg(long)]
        json: bool,

        /// Raw PCM sample rate; omit for WAV and compressed files
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Raw PCM channel count
        #[arg(long)]
        channels: Option<usize>,

        /// Raw PCM bit depth (16, 24 or 32)
        #[arg(long, value_parser = validate_bit_depth)]
        bit_depth: Option<u8>,
    },
}

pub fn validate_bit_depth(s: &str) -> Result<u8, String> {
    match s.parse::<u8>() {
        Ok(depth @ (16 | 24 | 32)) => Ok(depth),
        Ok(_) => Err("Bit depth must be 16, 24, or 32".to_string()),
        Err(_) => Err("Invalid bit depth value".to_string()),
    }
}

pub fn validate_max_words(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("max-words must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err("Invalid max-words value".to_string()),
    }
}
