use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use std::sync::{Arc, Mutex};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::{decode_audio, ffmpeg};
use crate::engine::{EngineRequest, EngineTranscript, SpeechEngine};
use crate::error::AudioError;
use crate::subtitle::RawSegment;
use crate::whisper::config::WhisperConfig;
use crate::whisper::resampler::{WHISPER_SAMPLE_RATE, downmix_to_mono, resample_to_16khz};

/// Whisper model loaded once and shared across requests.
#[derive(Clone)]
pub struct SimpleTranscriber {
    inner: Arc<Mutex<TranscriberInner>>,
    config: WhisperConfig,
}

struct TranscriberInner {
    ctx: WhisperContext,
}

impl SimpleTranscriber {
    pub fn new(config: WhisperConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(anyhow!(
                "Whisper model not found at: {}",
                config.model_path.display()
            ));
        }

        let model_path = config
            .model_path
            .to_str()
            .ok_or_else(|| anyhow!("Model path is not valid UTF-8"))?;

        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(config.use_gpu);

        let ctx = WhisperContext::new_with_params(model_path, ctx_params)
            .map_err(|e| anyhow!("Failed to load model: {}", e))?;

        Ok(Self {
            inner: Arc::new(Mutex::new(TranscriberInner { ctx })),
            config,
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }

    fn load_samples(&self, request: &EngineRequest) -> Result<Vec<f32>> {
        let bytes = std::fs::read(&request.audio_path).with_context(|| {
            format!("Failed to read audio file {}", request.audio_path.display())
        })?;
        let samples = match decode_audio(&bytes, request.pcm_format) {
            Err(AudioError::Compressed(container)) => {
                info!("Decoding {container} upload with ffmpeg");
                ffmpeg::decode_file(&request.audio_path, WHISPER_SAMPLE_RATE)?
            }
            decoded => {
                let audio = decoded?;
                info!(
                    "Decoded audio: {:.2}s, {}Hz, {} channels",
                    audio.duration_secs(),
                    audio.sample_rate,
                    audio.channels
                );
                let mono = downmix_to_mono(&audio.samples, audio.channels);
                resample_to_16khz(&mono, audio.sample_rate)?
            }
        };

        if samples.len() < WHISPER_SAMPLE_RATE as usize {
            return Err(anyhow!("Audio is too short (less than 1 second)"));
        }
        Ok(samples)
    }
}

impl SpeechEngine for SimpleTranscriber {
    fn transcribe(&self, request: &EngineRequest) -> Result<EngineTranscript> {
        let samples = self.load_samples(request)?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(self.config.fixed_language().unwrap_or("auto")));
        params.set_token_timestamps(request.word_timestamps);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_audio_ctx(self.config.audio_context);
        params.set_no_speech_thold(self.config.no_speech_threshold);
        params.set_n_threads(self.config.num_threads);

        let inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("Failed to acquire transcriber lock"))?;

        let mut state = inner
            .ctx
            .create_state()
            .map_err(|e| anyhow!("Failed to create whisper state: {}", e))?;

        debug!("Running whisper on {} samples", samples.len());
        state
            .full(params, &samples)
            .map_err(|e| anyhow!("Failed to run transcription: {}", e))?;

        let language = match self.config.fixed_language() {
            Some(code) => code.to_string(),
            None => {
                let id = state
                    .full_lang_id_from_state()
                    .map_err(|e| anyhow!("Failed to get detected language: {}", e))?;
                whisper_rs::get_lang_str(id)
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("Unknown language id: {}", id))?
            }
        };

        let num_segments = state
            .full_n_segments()
            .map_err(|e| anyhow!("Failed to get segment count: {}", e))?;

        let mut text = String::new();
        let mut segments = Vec::with_capacity(num_segments.max(0) as usize);
        for i in 0..num_segments {
            let segment_text = state
                .full_get_segment_text(i)
                .map_err(|e| anyhow!("Failed to get segment text: {}", e))?;
            // Segment times are reported in centiseconds.
            let t0 = state
                .full_get_segment_t0(i)
                .map_err(|e| anyhow!("Failed to get segment start: {}", e))?;
            let t1 = state
                .full_get_segment_t1(i)
                .map_err(|e| anyhow!("Failed to get segment end: {}", e))?;

            text.push_str(&segment_text);
            segments.push(RawSegment {
                start: t0 as f64 / 100.0,
                end: t1 as f64 / 100.0,
                text: segment_text.trim().to_string(),
            });
        }

        Ok(EngineTranscript {
            text: text.trim().to_string(),
            language,
            segments,
        })
    }
}
