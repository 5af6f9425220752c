use anyhow::{Result, anyhow};
use rubato::{Resampler, SincFixedIn, SincInterpolationType, WindowFunction};

/// Sample rate whisper.cpp expects.
pub const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Averages interleaved frames down to a single channel.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resamples mono audio to 16kHz.
pub fn resample_to_16khz(mono: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
    if sample_rate == WHISPER_SAMPLE_RATE {
        return Ok(mono.to_vec());
    }
    if sample_rate == 0 {
        return Err(anyhow!("Invalid sample rate: 0"));
    }

    let frames = mono.len();
    if frames == 0 {
        return Err(anyhow!("No audio frames to resample"));
    }

    let params = rubato::SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = WHISPER_SAMPLE_RATE as f64 / sample_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, 1)?;

    let mut output = resampler.process(&[mono], None)?;
    let resampled = output.pop().unwrap_or_default();

    // Skip the filter delay and keep the expected number of frames.
    let delay = resampler.output_delay();
    let expected = (frames as f64 * ratio) as usize;
    let end = (delay + expected).min(resampled.len());
    let start = delay.min(end);

    Ok(resampled[start..end].to_vec())
}
