//! Output sample format
//!
//! The engine mixes interleaved stereo signed 16-bit samples. The device binding
//! converts to whatever sample type the device negotiated.

/// Output channel count. Every resource is decoded to interleaved stereo.
pub const OUTPUT_CHANNELS: u16 = 2;

/// Negotiated (or desired) output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,

    /// Frames per device callback request
    pub buffer_frames: u32,
}

impl AudioFormat {
    /// Stereo format with the given rate and callback size
    pub fn stereo(sample_rate: u32, buffer_frames: u32) -> Self {
        Self {
            sample_rate,
            channels: OUTPUT_CHANNELS,
            buffer_frames,
        }
    }

    /// Interleaved samples in one callback request
    pub fn buffer_samples(&self) -> usize {
        self.buffer_frames as usize * self.channels as usize
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::stereo(48_000, 4096)
    }
}

impl From<&rtmix_common::config::AudioConfig> for AudioFormat {
    fn from(config: &rtmix_common::config::AudioConfig) -> Self {
        Self::stereo(config.sample_rate, config.buffer_frames)
    }
}
