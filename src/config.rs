use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::PcmFormat;
use crate::subtitle::chunker::ChunkOptions;

/// What `POST /transcribe/` answers with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// The subtitle file itself.
    #[default]
    Srt,
    /// A JSON summary with a download link to the subtitle file.
    Json,
}

impl FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "srt" => Ok(ResponseFormat::Srt),
            "json" => Ok(ResponseFormat::Json),
            other => Err(format!(
                "Unknown response format '{other}' (expected 'srt' or 'json')"
            )),
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseFormat::Srt => write!(f, "srt"),
            ResponseFormat::Json => write!(f, "json"),
        }
    }
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Where uploads and generated subtitle files are stored.
    pub upload_dir: PathBuf,
    /// Largest audio upload accepted, in bytes.
    pub max_upload_bytes: usize,
    pub chunk: ChunkOptions,
    pub response_format: ResponseFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            upload_dir: PathBuf::from("/tmp/"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            chunk: ChunkOptions::default(),
            response_format: ResponseFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `UPLOAD_DIR`, `MAX_UPLOAD_BYTES`, `MAX_WORDS`,
    /// `CHUNK_POLICY` and `RESPONSE_FORMAT`, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = lookup("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(value.trim());
        }
        if let Some(value) = lookup("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for MAX_UPLOAD_BYTES: '{value}'"))?;
        }
        if let Some(value) = lookup("MAX_WORDS") {
            config.chunk.max_words = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for MAX_WORDS: '{value}'"))?;
        }
        if let Some(value) = lookup("CHUNK_POLICY") {
            config.chunk.policy = value.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(value) = lookup("RESPONSE_FORMAT") {
            config.response_format = value.parse().map_err(anyhow::Error::msg)?;
        }
        if config.chunk.max_words == 0 {
            anyhow::bail!("MAX_WORDS must be at least 1");
        }
        Ok(config)
    }
}

#[derive(Debug)]
pub struct ClientConfig {
    pub server_url: String,
    pub audio_file: PathBuf,
    /// Where to save the subtitle file; defaults to the audio path with `.srt`.
    pub output: Option<PathBuf>,
    pub json: bool,
    /// Layout sent for headerless PCM files; compressed files need none.
    pub pcm_format: Option<PcmFormat>,
}

impl ClientConfig {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.audio_file.with_extension("srt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitle::chunker::ChunkPolicy;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.chunk.max_words, 3);
        assert_eq!(config.chunk.policy, ChunkPolicy::CharacterBudget);
        assert_eq!(config.response_format, ResponseFormat::Srt);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_server_overrides() {
        let config = ServerConfig::from_lookup(|key: &str| match key {
            "UPLOAD_DIR" => Some("/var/lib/srt".to_string()),
            "MAX_WORDS" => Some("4".to_string()),
            "MAX_UPLOAD_BYTES" => Some("1048576".to_string()),
            "CHUNK_POLICY" => Some("words".to_string()),
            "RESPONSE_FORMAT" => Some("JSON".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.upload_dir, PathBuf::from("/var/lib/srt"));
        assert_eq!(config.chunk.max_words, 4);
        assert_eq!(config.max_upload_bytes, 1024 * 1024);
        assert_eq!(config.chunk.policy, ChunkPolicy::WordCount);
        assert_eq!(config.response_format, ResponseFormat::Json);
    }

    #[test]
    fn test_server_rejects_bad_values() {
        let zero = ServerConfig::from_lookup(|key: &str| {
            (key == "MAX_WORDS").then(|| "0".to_string())
        });
        assert!(zero.is_err());

        let policy = ServerConfig::from_lookup(|key: &str| {
            (key == "CHUNK_POLICY").then(|| "lines".to_string())
        });
        assert!(policy.unwrap_err().to_string().contains("lines"));
    }

    #[test]
    fn test_client_output_defaults_next_to_audio() {
        let config = ClientConfig {
            server_url: "http://localhost:8080".to_string(),
            audio_file: PathBuf::from("samples/talk.wav"),
            output: None,
            json: false,
            pcm_format: None,
        };
        assert_eq!(config.output_path(), PathBuf::from("samples/talk.srt"));
    }
}
