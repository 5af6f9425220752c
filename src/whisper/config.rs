use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct WhisperConfig {
    pub model_path: PathBuf,
    pub use_gpu: bool,
    /// Language code, or `auto` to let the model detect it.
    pub language: String,
    pub audio_context: i32,
    pub no_speech_threshold: f32,
    pub num_threads: i32,
}

impl WhisperConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            use_gpu: true,
            language: "auto".to_string(),
            audio_context: 768,
            no_speech_threshold: 0.5,
            num_threads: 2,
        }
    }

    /// Reads `WHISPER_*` variables, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let model_path = lookup("WHISPER_MODEL_PATH")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("WHISPER_MODEL_PATH is not set"))?;

        let mut config = Self::new(model_path.trim());
        if let Some(value) = lookup("WHISPER_USE_GPU") {
            config.use_gpu = parse_bool(&value)
                .ok_or_else(|| anyhow!("WHISPER_USE_GPU must be true or false, got '{value}'"))?;
        }
        if let Some(value) = lookup("WHISPER_LANGUAGE") {
            config.language = value.trim().to_ascii_lowercase();
        }
        if let Some(value) = lookup("WHISPER_AUDIO_CTX") {
            config.audio_context = parse_var("WHISPER_AUDIO_CTX", &value)?;
        }
        if let Some(value) = lookup("WHISPER_NO_SPEECH_THRESHOLD") {
            config.no_speech_threshold = parse_var("WHISPER_NO_SPEECH_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("WHISPER_THREADS") {
            config.num_threads = parse_var("WHISPER_THREADS", &value)?;
        }
        Ok(config)
    }

    /// Language to force on the decoder, `None` when detection is requested.
    pub fn fixed_language(&self) -> Option<&str> {
        match self.language.as_str() {
            "" | "auto" => None,
            code => Some(code),
        }
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {key}: '{value}'"))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_model_path_is_required() {
        let err = WhisperConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("WHISPER_MODEL_PATH"));
    }

    #[test]
    fn test_defaults() {
        let config =
            WhisperConfig::from_lookup(lookup_from(&[("WHISPER_MODEL_PATH", "models/ggml-base.bin")]))
                .unwrap();
        assert_eq!(config.model_path, PathBuf::from("models/ggml-base.bin"));
        assert!(config.use_gpu);
        assert_eq!(config.fixed_language(), None);
        assert_eq!(config.audio_context, 768);
        assert_eq!(config.num_threads, 2);
    }

    #[test]
    fn test_overrides() {
        let config = WhisperConfig::from_lookup(lookup_from(&[
            ("WHISPER_MODEL_PATH", "m.bin"),
            ("WHISPER_USE_GPU", "no"),
            ("WHISPER_LANGUAGE", " EN "),
            ("WHISPER_THREADS", "8"),
            ("WHISPER_NO_SPEECH_THRESHOLD", "0.3"),
        ]))
        .unwrap();
        assert!(!config.use_gpu);
        assert_eq!(config.fixed_language(), Some("en"));
        assert_eq!(config.num_threads, 8);
        assert_eq!(config.no_speech_threshold, 0.3);
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = WhisperConfig::from_lookup(lookup_from(&[
            ("WHISPER_MODEL_PATH", "m.bin"),
            ("WHISPER_THREADS", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("WHISPER_THREADS"));
    }
}
