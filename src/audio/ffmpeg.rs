//! Compressed uploads (MP3, FLAC, Ogg, MP4, Matroska) decoded through ffmpeg.

use std::path::Path;

use ffmpeg_next::format::Sample;
use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::frame::audio::Audio;
use ffmpeg_next::{ChannelLayout, media};
use log::debug;

use crate::error::AudioError;

/// Decodes the best audio stream of `path` to mono f32 at `target_sample_rate`.
pub fn decode_file(path: &Path, target_sample_rate: u32) -> Result<Vec<f32>, AudioError> {
    let samples = decode_stream(path, target_sample_rate)
        .map_err(|e| AudioError::Ffmpeg(e.to_string()))?
        .ok_or(AudioError::NoAudioStream)?;

    if samples.is_empty() {
        return Err(AudioError::Empty);
    }
    debug!(
        "ffmpeg decoded {} samples at {}Hz from {}",
        samples.len(),
        target_sample_rate,
        path.display()
    );
    Ok(samples)
}

fn decode_stream(
    path: &Path,
    target_sample_rate: u32,
) -> Result<Option<Vec<f32>>, ffmpeg_next::Error> {
    ffmpeg_next::init()?;

    let mut ictx = ffmpeg_next::format::input(path)?;
    let Some(stream) = ictx.streams().best(media::Type::Audio) else {
        return Ok(None);
    };
    let stream_index = stream.index();

    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
    let mut decoder = codec_ctx.decoder().audio()?;

    let mut resampler = resampling::Context::get(
        decoder.format(),
        decoder.channel_layout(),
        decoder.rate(),
        Sample::F32(SampleType::Planar),
        ChannelLayout::MONO,
        target_sample_rate,
    )?;

    let mut samples = Vec::new();
    let mut decoded = Audio::empty();
    let mut resampled = Audio::empty();

    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder.send_packet(&packet)?;
        while decoder.receive_frame(&mut decoded).is_ok() {
            resampler.run(&decoded, &mut resampled)?;
            push_samples(&resampled, &mut samples);
        }
    }

    decoder.send_eof()?;
    while decoder.receive_frame(&mut decoded).is_ok() {
        resampler.run(&decoded, &mut resampled)?;
        push_samples(&resampled, &mut samples);
    }

    // The resampler may still hold buffered output.
    if let Ok(Some(delay)) = resampler.flush(&mut resampled) {
        if delay.output > 0 {
            push_samples(&resampled, &mut samples);
        }
    }

    Ok(Some(samples))
}

/// Appends the samples of a planar mono f32 frame.
fn push_samples(frame: &Audio, out: &mut Vec<f32>) {
    let count = frame.samples();
    if count == 0 {
        return;
    }
    let data = frame.data(0);
    // SAFETY: the resampler output is planar f32, so plane 0 holds `count` floats.
    let floats = unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f32, count) };
    out.extend_from_slice(floats);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_reported() {
        let result = decode_file(Path::new("/nonexistent/talk.mp3"), 16000);
        assert!(matches!(result, Err(AudioError::Ffmpeg(_))));
    }

    #[test]
    fn test_garbage_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, [0u8; 16]).unwrap();
        assert!(decode_file(&path, 16000).is_err());
    }
}
