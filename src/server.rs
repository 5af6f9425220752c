use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use actix_cors::Cors;
use actix_multipart::{Field, Multipart};
use actix_web::http::header::ContentDisposition;
use actix_web::{App, HttpResponse, HttpServer, Responder, get, middleware::Logger, post, web};
use anyhow::anyhow;
use futures_util::TryStreamExt;
use log::{debug, error, info, warn};
use serde::Deserialize;
use uuid::Uuid;

use crate::audio::PcmFormat;
use crate::config::{ResponseFormat, ServerConfig};
use crate::dto::TranscriptionDto;
use crate::engine::{EngineRequest, SpeechEngine};
use crate::error::TranscribeError;
use crate::pipeline::{TranscriptResult, subtitle_path_for, transcribe_file};
use crate::subtitle::srt;

pub struct AppState {
    pub engine: Arc<dyn SpeechEngine>,
    pub config: ServerConfig,
}

#[derive(Debug, Deserialize)]
pub struct TranscribeQuery {
    pub format: Option<ResponseFormat>,
}

struct Upload {
    filename: String,
    bytes: Vec<u8>,
    pcm_format: Option<PcmFormat>,
}

/// Text fields only carry small numbers.
const MAX_TEXT_FIELD_BYTES: usize = 64;

#[get("/api/v1/health")]
pub async fn health_check() -> impl Responder {
    debug!("Health check endpoint called");
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "message": "Subtitle transcription service is running"
    }))
}

#[post("/transcribe/")]
pub async fn transcribe_upload(
    data: web::Data<AppState>,
    query: web::Query<TranscribeQuery>,
    mut payload: Multipart,
) -> Result<HttpResponse, TranscribeError> {
    debug!("Transcription request received");

    let upload = read_upload(&mut payload, data.config.max_upload_bytes).await?;
    info!(
        "Received '{}': {} bytes",
        upload.filename,
        upload.bytes.len()
    );

    let audio_path = store_upload(&data.config.upload_dir, &upload).await?;
    let request = EngineRequest {
        audio_path: audio_path.clone(),
        word_timestamps: true,
        pcm_format: upload.pcm_format,
    };

    let engine = Arc::clone(&data.engine);
    let options = data.config.chunk;
    let outcome = web::block(move || transcribe_file(engine.as_ref(), &request, &options)).await;
    remove_upload(&audio_path).await;

    let result = outcome
        .map_err(|e| TranscribeError::Engine(anyhow!("Transcription task failed: {e}")))?
        .inspect_err(|e| error!("Transcription failed: {e}"))?;

    match query.format.unwrap_or(data.config.response_format) {
        ResponseFormat::Srt => Ok(subtitle_response(&result).await?),
        ResponseFormat::Json => {
            let name = result.subtitle_file_name().unwrap_or_default();
            let url = format!("/download/{name}");
            Ok(HttpResponse::Ok().json(TranscriptionDto::new(&result, url)))
        }
    }
}

#[get("/download/{filename}")]
pub async fn download_subtitle(
    data: web::Data<AppState>,
    filename: web::Path<String>,
) -> Result<HttpResponse, TranscribeError> {
    let filename = filename.into_inner();
    if !is_downloadable(&filename) {
        warn!("Rejected download of '{filename}'");
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Invalid file name"
        })));
    }

    let path = data.config.upload_dir.join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Serving {} ({} bytes)", path.display(), bytes.len());
            Ok(attachment(&filename, bytes))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(HttpResponse::NotFound().json(serde_json::json!({
                "error": "File not found"
            })))
        }
        Err(e) => Err(e.into()),
    }
}

async fn subtitle_response(result: &TranscriptResult) -> Result<HttpResponse, TranscribeError> {
    let bytes = tokio::fs::read(&result.subtitle_path).await?;
    let name = result.subtitle_file_name().unwrap_or("subtitles.srt");
    Ok(attachment(name, bytes))
}

fn attachment(filename: &str, bytes: Vec<u8>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(srt::CONTENT_TYPE)
        .insert_header(ContentDisposition::attachment(filename))
        .body(bytes)
}

async fn read_upload(payload: &mut Multipart, limit: usize) -> Result<Upload, TranscribeError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut pcm_format: Option<PcmFormat> = None;

    while let Some(field) = payload
        .try_next()
        .await
        .map_err(|e| TranscribeError::Upload(format!("Invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "audio" => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or("upload")
                    .to_string();
                let data = read_field_data(field, limit).await?;
                debug!("Audio data received: {} bytes", data.len());
                file = Some((filename, data));
            }
            "sample_rate" => {
                pcm_format.get_or_insert_with(PcmFormat::default).sample_rate =
                    parse_field(field, "sample_rate").await?
            }
            "channels" => {
                pcm_format.get_or_insert_with(PcmFormat::default).channels =
                    parse_field(field, "channels").await?
            }
            "bit_depth" => {
                pcm_format.get_or_insert_with(PcmFormat::default).bit_depth =
                    parse_field(field, "bit_depth").await?
            }
            _ => continue,
        }
    }

    match file {
        Some((_, bytes)) if bytes.is_empty() => {
            warn!("Empty audio file in transcription request");
            Err(TranscribeError::Upload("No audio data provided".to_string()))
        }
        Some((filename, bytes)) => Ok(Upload {
            filename,
            bytes,
            pcm_format,
        }),
        None => {
            warn!("No audio file provided in transcription request");
            Err(TranscribeError::Upload("No audio file provided".to_string()))
        }
    }
}

/// Buffers one field, failing once it grows past `limit` bytes.
async fn read_field_data(mut field: Field, limit: usize) -> Result<Vec<u8>, TranscribeError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| {
        error!("Failed to read upload data: {e}");
        TranscribeError::Upload("Failed to read upload data".to_string())
    })? {
        if data.len() + chunk.len() > limit {
            warn!("Rejected upload field larger than {limit} bytes");
            return Err(TranscribeError::PayloadTooLarge { limit });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn parse_field<T: FromStr>(field: Field, name: &str) -> Result<T, TranscribeError> {
    let invalid = || TranscribeError::Upload(format!("Invalid value for {name}"));
    let data = read_field_data(field, MAX_TEXT_FIELD_BYTES)
        .await
        .map_err(|_| invalid())?;
    let text = String::from_utf8(data).map_err(|_| invalid())?;
    let value = text.trim().parse().map_err(|_| invalid())?;
    debug!("{name} set to: {}", text.trim());
    Ok(value)
}

async fn store_upload(dir: &Path, upload: &Upload) -> Result<PathBuf, TranscribeError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "{}_{}",
        Uuid::new_v4(),
        sanitize_filename(&upload.filename)
    ));
    write_upload(&path, &upload.bytes).await?;
    debug!("Stored upload at {}", path.display());
    Ok(path)
}

/// Writes `bytes` to `path`, leaving no partial file behind on failure.
async fn write_upload(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Err(e) = tokio::fs::write(path, bytes).await {
        error!("Failed to store upload at {}: {e}", path.display());
        let _ = tokio::fs::remove_file(path).await;
        return Err(e);
    }
    Ok(())
}

async fn remove_upload(audio_path: &Path) {
    // An upload named *.srt shares its path with the generated subtitles.
    if subtitle_path_for(audio_path) == audio_path {
        return;
    }
    if let Err(e) = tokio::fs::remove_file(audio_path).await {
        warn!("Failed to remove upload {}: {e}", audio_path.display());
    }
}

/// Keeps the last path component and replaces anything unusual with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Only generated subtitle files directly inside the upload dir are served.
fn is_downloadable(filename: &str) -> bool {
    Path::new(filename).file_name() == Some(OsStr::new(filename))
        && !filename.contains('\\')
        && filename.ends_with(".srt")
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(transcribe_upload)
        .service(download_subtitle);
}

pub async fn run_server(config: ServerConfig, engine: Arc<dyn SpeechEngine>) -> std::io::Result<()> {
    let host = config.host.clone();
    let port = config.port;
    info!(
        "Upload dir: {}, upload limit={} bytes, max_words={}, chunk policy={}, default response={}",
        config.upload_dir.display(),
        config.max_upload_bytes,
        config.chunk.max_words,
        config.chunk.policy,
        config.response_format
    );

    let app_state = web::Data::new(AppState { engine, config });

    info!("Starting HTTP server on {host}:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .configure(routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::FakeEngine;
    use crate::subtitle::RawSegment;
    use crate::subtitle::chunker::{ChunkOptions, ChunkPolicy};
    use actix_web::http::{StatusCode, header};
    use actix_web::test;

    const BOUNDARY: &str = "----srt-transcribe-test";

    fn state(
        dir: &Path,
        engine: impl Into<Arc<FakeEngine>>,
        response_format: ResponseFormat,
    ) -> AppState {
        let engine: Arc<FakeEngine> = engine.into();
        AppState {
            engine,
            config: ServerConfig {
                upload_dir: dir.to_path_buf(),
                chunk: ChunkOptions {
                    max_words: 3,
                    policy: ChunkPolicy::WordCount,
                },
                response_format,
                ..ServerConfig::default()
            },
        }
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let disposition = match filename {
                Some(f) => format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n"),
                None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(uri: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    fn speech() -> FakeEngine {
        FakeEngine::returning(vec![
            RawSegment::new(0.0, 3.0, "one two three four five six"),
            RawSegment::new(3.5, 4.0, "seven"),
        ])
    }

    #[actix_web::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(dir.path(), speech(), ResponseFormat::Srt)))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
    }

    #[actix_web::test]
    async fn test_transcribe_returns_subtitle_file() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(dir.path(), speech(), ResponseFormat::Srt)))
                .configure(routes),
        )
        .await;

        let body = multipart_body(&[("file", Some("talk.mp3"), b"fake audio".as_slice())]);
        let resp = test::call_service(&app, upload_request("/transcribe/", body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));
        let disposition = resp.headers().get(header::CONTENT_DISPOSITION).unwrap();
        assert!(disposition.to_str().unwrap().contains("_talk.srt"));

        let bytes = test::read_body(resp).await;
        let text = std::str::from_utf8(&bytes).unwrap();
        let cues = srt::parse(text).unwrap();
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].text, "one two three");
        assert!(text.starts_with("1\n00:00:00,000 --> 00:00:01,500\none two three\n\n"));

        // Upload removed, subtitles kept for download.
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with("_talk.srt"));
    }

    #[actix_web::test]
    async fn test_transcribe_json_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(dir.path(), speech(), ResponseFormat::Srt)))
                .configure(routes),
        )
        .await;

        let body = multipart_body(&[
            ("audio", Some("clip.raw"), [0u8; 64].as_slice()),
            ("sample_rate", None, b"8000".as_slice()),
            ("bit_depth", None, b"16".as_slice()),
        ]);
        let req = upload_request("/transcribe/?format=json", body).to_request();
        let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(json["text"], "one two three four five six seven");
        assert_eq!(json["language"], "en");
        assert_eq!(json["segments"].as_array().unwrap().len(), 3);
        assert_eq!(json["segments"][1]["start"], 1.5);
        assert_eq!(json["segments"][2]["text"], "seven");

        let url = json["srt_file_url"].as_str().unwrap();
        assert!(url.starts_with("/download/") && url.ends_with("_clip.srt"));

        let req = test::TestRequest::get().uri(url).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = test::read_body(resp).await;
        assert_eq!(srt::parse(std::str::from_utf8(&bytes).unwrap()).unwrap().len(), 3);
    }

    #[actix_web::test]
    async fn test_configured_json_default() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(dir.path(), speech(), ResponseFormat::Json)))
                .configure(routes),
        )
        .await;

        let body = multipart_body(&[("file", Some("a.wav"), b"x".as_slice())]);
        let json: serde_json::Value =
            test::call_and_read_body_json(&app, upload_request("/transcribe/", body).to_request()).await;
        assert_eq!(json["segments"].as_array().unwrap().len(), 3);
    }

    #[actix_web::test]
    async fn test_missing_file_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(dir.path(), speech(), ResponseFormat::Srt)))
                .configure(routes),
        )
        .await;

        let body = multipart_body(&[("sample_rate", None, b"16000".as_slice())]);
        let resp = test::call_service(&app, upload_request("/transcribe/", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = multipart_body(&[("file", Some("a.wav"), b"x".as_slice()), ("channels", None, b"two".as_slice())]);
        let resp = test::call_service(&app, upload_request("/transcribe/", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_engine_failure_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::failing("decoder crashed");
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(dir.path(), engine, ResponseFormat::Srt)))
                .configure(routes),
        )
        .await;

        let body = multipart_body(&[("file", Some("a.wav"), b"x".as_slice())]);
        let resp = test::call_service(&app, upload_request("/transcribe/", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("decoder crashed"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn test_download_missing_and_rejected_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("secret.txt"), "nope").unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(dir.path(), speech(), ResponseFormat::Srt)))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/download/missing.srt").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/download/secret.txt").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_failed_upload_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("talk.mp3");
        assert!(write_upload(&path, b"audio").await.is_err());
        assert!(!path.exists());

        let path = dir.path().join("talk.mp3");
        write_upload(&path, b"audio").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"audio");
    }

    #[actix_web::test]
    async fn test_dotted_upload_name_can_be_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(dir.path(), speech(), ResponseFormat::Json)))
                .configure(routes),
        )
        .await;

        let body = multipart_body(&[("file", Some("interview..final.mp3"), b"x".as_slice())]);
        let json: serde_json::Value =
            test::call_and_read_body_json(&app, upload_request("/transcribe/", body).to_request()).await;
        let url = json["srt_file_url"].as_str().unwrap();
        assert!(url.ends_with("_interview..final.srt"));

        let resp = test::call_service(&app, test::TestRequest::get().uri(url).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_oversized_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut app_state = state(dir.path(), speech(), ResponseFormat::Srt);
        app_state.config.max_upload_bytes = 16;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state))
                .configure(routes),
        )
        .await;

        let body = multipart_body(&[("file", Some("big.wav"), [7u8; 64].as_slice())]);
        let resp = test::call_service(&app, upload_request("/transcribe/", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let body = multipart_body(&[("file", Some("small.wav"), [7u8; 16].as_slice())]);
        let resp = test::call_service(&app, upload_request("/transcribe/", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_pcm_layout_only_forwarded_when_described() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(speech());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(dir.path(), engine.clone(), ResponseFormat::Srt)))
                .configure(routes),
        )
        .await;

        let mut mp3 = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
        mp3.extend_from_slice(&[0xff, 0xfb, 0x90, 0x64]);
        mp3.extend_from_slice(&[0u8; 512]);
        let body = multipart_body(&[("file", Some("talk.mp3"), mp3.as_slice())]);
        let resp = test::call_service(&app, upload_request("/transcribe/", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = multipart_body(&[
            ("file", Some("clip.raw"), [0u8; 32].as_slice()),
            ("channels", None, b"2".as_slice()),
        ]);
        let resp = test::call_service(&app, upload_request("/transcribe/", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].pcm_format, None);
        assert_eq!(
            seen[1].pcm_format,
            Some(PcmFormat {
                channels: 2,
                ..PcmFormat::default()
            })
        );
    }
}
