//! In-memory loaders

use rtmix_engine::audio::Loader;
use rtmix_engine::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Interleaved stereo ramp: frame `i` is `[i, -i]` (wrapping at i16 range)
pub fn ramp_samples(frames: usize) -> Vec<i16> {
    (0..frames)
        .flat_map(|i| {
            let value = i as i16;
            [value, value.wrapping_neg()]
        })
        .collect()
}

/// Serves chunks from a stereo sample vector
pub struct VecLoader {
    samples: Vec<i16>,
    calls: AtomicUsize,
}

impl VecLoader {
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ramp(frames: usize) -> Self {
        Self::new(ramp_samples(frames))
    }

    /// load_chunk calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Loader for VecLoader {
    fn load_chunk(&self, dest: &mut [i16], frame_offset: u64) -> Result<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let start = (frame_offset as usize * 2).min(self.samples.len());
        let n = (dest.len() & !1).min(self.samples.len() - start);
        dest[..n].copy_from_slice(&self.samples[start..start + n]);
        Ok(n)
    }
}

/// Every load fails
pub struct FailingLoader;

impl Loader for FailingLoader {
    fn load_chunk(&self, _dest: &mut [i16], frame_offset: u64) -> Result<usize> {
        Err(Error::Decode(format!("corrupt data at frame {}", frame_offset)))
    }
}
