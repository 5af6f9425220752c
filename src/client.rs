use anyhow::{Result, anyhow};
use serde_json::Value;
use std::fs;

use crate::config::ClientConfig;
use crate::subtitle::srt;

pub async fn send_transcription_request(config: &ClientConfig, json: bool) -> Result<String> {
    let client = reqwest::Client::new();

    if !config.audio_file.exists() {
        return Err(anyhow!(
            "Audio file not found: {}",
            config.audio_file.display()
        ));
    }
    let audio_data =
        fs::read(&config.audio_file).map_err(|e| anyhow!("Failed to read audio file: {}", e))?;

    println!(
        "📁 Audio source: {} ({} bytes)",
        config.audio_file.display(),
        audio_data.len()
    );

    let filename = config
        .audio_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    let mut form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(audio_data).file_name(filename),
    );
    if let Some(pcm) = config.pcm_format {
        println!(
            "🎚️  Raw PCM: {}Hz, {} channels, {}-bit",
            pcm.sample_rate, pcm.channels, pcm.bit_depth
        );
        form = form
            .text("sample_rate", pcm.sample_rate.to_string())
            .text("channels", pcm.channels.to_string())
            .text("bit_depth", pcm.bit_depth.to_string());
    }

    let format = if json { "json" } else { "srt" };
    let url = format!("{}/transcribe/?format={format}", config.server_url);
    println!("🚀 Sending transcription request to: {url}");

    let response = client
        .post(&url)
        .multipart(form)
        .send()
        .await
        .map_err(|e| anyhow!("Failed to send request: {}", e))?;

    let status = response.status();
    let response_text = response
        .text()
        .await
        .map_err(|e| anyhow!("Failed to read response: {}", e))?;

    if !status.is_success() {
        return Err(anyhow!(
            "Server returned error {}: {}",
            status,
            response_text
        ));
    }

    Ok(response_text)
}

pub async fn check_server_health(server_url: &str) -> Result<()> {
    let client = reqwest::Client::new();

    println!("🔍 Checking server health at: {server_url}/api/v1/health");

    let response = client
        .get(format!("{server_url}/api/v1/health"))
        .send()
        .await
        .map_err(|e| anyhow!("Failed to connect to server: {}", e))?;

    if response.status().is_success() {
        println!("✅ Server is healthy");
        Ok(())
    } else {
        Err(anyhow!("Server health check failed: {}", response.status()))
    }
}

pub async fn run_client(config: ClientConfig) -> Result<()> {
    println!("🎵 srt-transcribe client");
    println!("========================");

    check_server_health(&config.server_url).await?;

    if config.json {
        let body = send_transcription_request(&config, true).await?;
        let json: Value = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse JSON response: {}", e))?;
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    let subtitles = send_transcription_request(&config, false).await?;
    let cues = srt::parse(&subtitles)?;

    let output = config.output_path();
    fs::write(&output, &subtitles)
        .map_err(|e| anyhow!("Failed to write {}: {}", output.display(), e))?;

    println!("✅ Saved {} cues to {}", cues.len(), output.display());
    if let Some(first) = cues.first() {
        println!(
            "   First cue: [{}] {}",
            srt::format_timestamp(first.start),
            first.text
        );
    }
    Ok(())
}
