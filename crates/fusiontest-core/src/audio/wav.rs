//! 16-bit stereo PCM container for the fallback playback path
//!
//! ## File Format
//!
//! Canonical 44-byte header followed by interleaved little-endian `i16`
//! samples:
//!
//! | Offset | Size | Field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 4    | `RIFF`                                 |
//! | 4      | 4    | file size - 8                          |
//! | 8      | 4    | `WAVE`                                 |
//! | 12     | 4    | `fmt `                                 |
//! | 16     | 4    | 16 (fmt chunk size)                    |
//! | 20     | 2    | 1 (PCM)                                |
//! | 22     | 2    | channel count                          |
//! | 24     | 4    | sample rate                            |
//! | 28     | 4    | byte rate                              |
//! | 32     | 2    | block align                            |
//! | 34     | 2    | bits per sample (16)                   |
//! | 36     | 4    | `data`                                 |
//! | 40     | 4    | data size in bytes                     |

use crate::audio::scene::StereoScene;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use thiserror::Error;

/// Size of the canonical header in bytes
pub const HEADER_LEN: usize = 44;

/// Channel count of the container
pub const CHANNELS: u16 = 2;

/// Bits per sample
pub const BITS_PER_SAMPLE: u16 = 16;

/// Full-scale value used for float <-> i16 conversion
const FULL_SCALE: f32 = 32768.0;

/// Errors produced while encoding or decoding a container
#[derive(Error, Debug)]
pub enum WavError {
    #[error("Malformed WAV header: {0}")]
    MalformedHeader(String),

    #[error("Unsupported WAV format: {channels} channels, {bits} bits")]
    UnsupportedFormat { channels: u16, bits: u16 },

    #[error("WAV codec error: {0}")]
    Hound(#[from] hound::Error),

    #[error("Container too large: {0} bytes of sample data")]
    TooLarge(usize),
}

/// Convert a float sample to 16-bit PCM, clipping at full scale
pub fn to_pcm16(sample: f32) -> i16 {
    let scaled = (sample * FULL_SCALE).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert a 16-bit PCM sample back to float
pub fn from_pcm16(sample: i16) -> f32 {
    sample as f32 / FULL_SCALE
}

/// Encode a scene as an in-memory WAV container
///
/// # Example
/// ```
/// use fusiontest_core::audio::scene::StereoScene;
/// use fusiontest_core::audio::wav::{encode_scene, HEADER_LEN};
///
/// let scene = StereoScene::silence(10, 44100);
/// let bytes = encode_scene(&scene).unwrap();
/// assert_eq!(bytes.len(), HEADER_LEN + 10 * 4);
/// assert_eq!(&bytes[0..4], b"RIFF");
/// ```
pub fn encode_scene(scene: &StereoScene) -> Result<Vec<u8>, WavError> {
    let block_align = (CHANNELS * BITS_PER_SAMPLE / 8) as usize;
    let data_len = scene.total_samples() * block_align;
    if u32::try_from(data_len + HEADER_LEN - 8).is_err() {
        return Err(WavError::TooLarge(data_len));
    }

    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: scene.sample_rate(),
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Vec::with_capacity(HEADER_LEN + data_len);
    {
        let mut writer = WavWriter::new(Cursor::new(&mut buffer), spec)?;
        for (&l, &r) in scene.left().iter().zip(scene.right().iter()) {
            writer.write_sample(to_pcm16(l))?;
            writer.write_sample(to_pcm16(r))?;
        }
        // Finalize patches the RIFF and data sizes
        writer.finalize()?;
    }

    Ok(buffer)
}

/// Decode a container produced by [`encode_scene`] back into a scene
pub fn decode_scene(bytes: &[u8]) -> Result<StereoScene, WavError> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::MalformedHeader(
            "missing RIFF/WAVE signature".to_string(),
        ));
    }

    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels != CHANNELS
        || spec.bits_per_sample != BITS_PER_SAMPLE
        || spec.sample_format != SampleFormat::Int
    {
        return Err(WavError::UnsupportedFormat {
            channels: spec.channels,
            bits: spec.bits_per_sample,
        });
    }

    let frames = reader.duration() as usize;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for (i, sample) in reader.into_samples::<i16>().enumerate() {
        let value = from_pcm16(sample?);
        if i % 2 == 0 {
            left.push(value);
        } else {
            right.push(value);
        }
    }

    Ok(StereoScene::from_channels(left, right, spec.sample_rate))
}
