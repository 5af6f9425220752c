use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{error, info};

use srt_transcribe::audio::PcmFormat;
use srt_transcribe::cli::{Cli, Commands};
use srt_transcribe::client::run_client;
use srt_transcribe::config::{ClientConfig, ServerConfig};
use srt_transcribe::server::run_server;
use srt_transcribe::whisper::{SimpleTranscriber, WhisperConfig};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            model_path,
            upload_dir,
            max_words,
            chunk_policy,
            response_format,
        } => {
            let mut config = ServerConfig::from_env()?;
            config.host = host;
            config.port = port;
            if let Some(dir) = upload_dir {
                config.upload_dir = dir;
            }
            if let Some(max_words) = max_words {
                config.chunk.max_words = max_words;
            }
            if let Some(policy) = chunk_policy {
                config.chunk.policy = policy;
            }
            if let Some(format) = response_format {
                config.response_format = format;
            }

            let whisper_config = WhisperConfig::from_lookup(|key| match (key, &model_path) {
                ("WHISPER_MODEL_PATH", Some(path)) => Some(path.display().to_string()),
                _ => std::env::var(key).ok(),
            })?;
            info!(
                "Using configuration: model_path={:?}, use_gpu={}, language={}, num_threads={}",
                whisper_config.model_path,
                whisper_config.use_gpu,
                whisper_config.language,
                whisper_config.num_threads
            );

            info!("Loading Whisper model...");
            let transcriber = SimpleTranscriber::new(whisper_config).inspect_err(|e| {
                error!("Failed to initialize transcriber: {e}");
            })?;
            info!("Whisper model loaded successfully");

            run_server(config, Arc::new(transcriber)).await?;
        }
        Commands::TranscribeFile {
            audio_file,
            server_url,
            output,
            json,
            sample_rate,
            channels,
            bit_depth,
        } => {
            let config = ClientConfig {
                server_url: server_url.trim_end_matches('/').to_string(),
                audio_file,
                output,
                json,
                pcm_format: (sample_rate.is_some() || channels.is_some() || bit_depth.is_some())
                    .then(|| {
                        let defaults = PcmFormat::default();
                        PcmFormat {
                            sample_rate: sample_rate.unwrap_or(defaults.sample_rate),
                            channels: channels.unwrap_or(defaults.channels),
                            bit_depth: bit_depth.unwrap_or(defaults.bit_depth),
                        }
                    }),
            };
            run_client(config).await?;
        }
    }

    Ok(())
}
