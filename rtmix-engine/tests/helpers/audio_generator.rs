//! Audio Test File Generation Utilities
//!
//! Generate deterministic 16-bit WAV files with known sample values so decode
//! results can be compared sample by sample.

use hound::{WavSpec, WavWriter};
use std::path::Path;

/// Standard test sample rate
const TEST_SAMPLE_RATE: u32 = 48_000;

fn spec(channels: u16) -> WavSpec {
    WavSpec {
        channels,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Generate a ramp WAV file
///
/// Frame `i` holds `i` on the first channel and `-i` on the second (if any).
///
/// # Arguments
/// * `path` - Output file path
/// * `channels` - 1 (mono) or 2 (stereo)
/// * `frames` - Number of frames (keep below 32768)
pub fn generate_ramp_wav<P: AsRef<Path>>(path: P, channels: u16, frames: u32) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec(channels))?;

    for i in 0..frames {
        let value = i as i16;
        writer.write_sample(value)?;
        if channels > 1 {
            writer.write_sample(-value)?;
        }
    }

    writer.finalize()?;
    Ok(())
}

/// Generate a stereo WAV file where every sample is `value`
pub fn generate_constant_wav<P: AsRef<Path>>(path: P, frames: u32, value: i16) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec(2))?;

    for _ in 0..frames * 2 {
        writer.write_sample(value)?;
    }

    writer.finalize()?;
    Ok(())
}
