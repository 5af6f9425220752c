pub mod ffmpeg;

use std::fmt;
use std::io::Cursor;

use hound::{SampleFormat, WavReader};
use log::{debug, error};

use crate::error::AudioError;

/// Layout of headerless PCM uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: usize,
    pub bit_depth: u8,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            bit_depth: 16,
        }
    }
}

/// Interleaved f32 samples in `[-1.0, 1.0]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        (self.samples.len() / self.channels) as f64 / self.sample_rate as f64
    }
}

/// Container formats recognised from the first bytes of an upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Wav,
    Mp3,
    Flac,
    Ogg,
    Mp4,
    Matroska,
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Container::Wav => "WAV",
            Container::Mp3 => "MP3",
            Container::Flac => "FLAC",
            Container::Ogg => "Ogg",
            Container::Mp4 => "MP4",
            Container::Matroska => "Matroska",
        };
        f.write_str(name)
    }
}

pub fn sniff_container(bytes: &[u8]) -> Option<Container> {
    if bytes.len() < 4 {
        return None;
    }
    match &bytes[0..4] {
        b"RIFF" if bytes.len() >= 12 && &bytes[8..12] == b"WAVE" => Some(Container::Wav),
        b"fLaC" => Some(Container::Flac),
        b"OggS" => Some(Container::Ogg),
        [0x1a, 0x45, 0xdf, 0xa3] => Some(Container::Matroska),
        _ if bytes.starts_with(b"ID3") || is_mpeg_frame_header(&bytes[0..4]) => {
            Some(Container::Mp3)
        }
        _ if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" => Some(Container::Mp4),
        _ => None,
    }
}

/// MPEG audio frame sync with no reserved version, layer, bitrate or rate bits.
fn is_mpeg_frame_header(header: &[u8]) -> bool {
    let version = (header[1] >> 3) & 0b11;
    let layer = (header[1] >> 1) & 0b11;
    let bitrate = header[2] >> 4;
    let rate = (header[2] >> 2) & 0b11;
    header[0] == 0xff
        && header[1] & 0xe0 == 0xe0
        && version != 0b01
        && layer != 0b00
        && bitrate != 0b1111
        && rate != 0b11
}

/// Decodes an uploaded file held in memory.
///
/// RIFF/WAVE data is read from its header. When the client described a PCM
/// layout the bytes are taken as raw PCM in that layout. Otherwise recognised
/// compressed containers are refused with [`AudioError::Compressed`] (see
/// [`ffmpeg::decode_file`]) and anything else is read as raw PCM in the
/// default layout.
pub fn decode_audio(bytes: &[u8], pcm: Option<PcmFormat>) -> Result<DecodedAudio, AudioError> {
    if bytes.is_empty() {
        return Err(AudioError::Empty);
    }

    let audio = match (sniff_container(bytes), pcm) {
        (Some(Container::Wav), _) => decode_wav(bytes)?,
        (Some(container), None) => {
            debug!("Upload looks like {container}, not decoding as PCM");
            return Err(AudioError::Compressed(container));
        }
        (_, format) => decode_raw(bytes, format.unwrap_or_default())?,
    };

    if audio.samples.is_empty() {
        return Err(AudioError::Empty);
    }
    Ok(audio)
}

fn decode_raw(bytes: &[u8], format: PcmFormat) -> Result<DecodedAudio, AudioError> {
    debug!(
        "Treating {} bytes as raw {}-bit PCM",
        bytes.len(),
        format.bit_depth
    );
    if format.channels == 0 {
        return Err(AudioError::InvalidChannels(0));
    }
    Ok(DecodedAudio {
        samples: convert_pcm_bytes(bytes, format.bit_depth)?,
        sample_rate: format.sample_rate,
        channels: format.channels,
    })
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, AudioError> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| AudioError::Wav(e.to_string()))?;
    let spec = reader.spec();
    debug!(
        "WAV header: {}Hz, {} channels, {} bit {:?}",
        spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
    );

    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AudioError::Wav(e.to_string()))?,
        SampleFormat::Int => {
            if !(8..=32).contains(&spec.bits_per_sample) {
                return Err(AudioError::UnsupportedBitDepth(spec.bits_per_sample));
            }
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|s| s as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AudioError::Wav(e.to_string()))?
        }
    };

    if spec.channels == 0 {
        return Err(AudioError::InvalidChannels(0));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels as usize,
    })
}

/// Converts little-endian signed PCM bytes to f32 samples.
pub fn convert_pcm_bytes(audio_bytes: &[u8], bit_depth: u8) -> Result<Vec<f32>, AudioError> {
    let width = match bit_depth {
        16 => 2,
        24 => 3,
        32 => 4,
        _ => {
            error!("Unsupported bit depth: {bit_depth}");
            return Err(AudioError::UnsupportedBitDepth(bit_depth as u16));
        }
    };

    if audio_bytes.len() % width != 0 {
        error!(
            "Invalid {}-bit audio data: byte count ({}) not divisible by {}",
            bit_depth,
            audio_bytes.len(),
            width
        );
        return Err(AudioError::Misaligned {
            bit_depth,
            len: audio_bytes.len(),
            width,
        });
    }

    let samples: Vec<f32> = match bit_depth {
        16 => audio_bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
            .collect(),
        24 => audio_bytes
            .chunks_exact(3)
            .map(|b| (i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8) as f32 / 8388607.0)
            .collect(),
        _ => audio_bytes
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / i32::MAX as f32)
            .collect(),
    };

    debug!(
        "Converted {} bytes of {}-bit audio to {} samples",
        audio_bytes.len(),
        bit_depth,
        samples.len()
    );
    Ok(samples)
}
