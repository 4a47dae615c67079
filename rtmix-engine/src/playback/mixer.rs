//! Real-time mixer
//!
//! Sums every playing sound into a wide i32 accumulation buffer, then narrows
//! the sum to i16 output.
//!
//! # Per-callback algorithm
//!
//! 1. Zero the accumulation buffer
//! 2. For every category, for every playing sound: pull samples from its
//!    resource until the request is covered, the resource is not ready
//!    (the sound stalls for this callback), or the stream ends
//! 3. Remove finished sounds by swap-with-last, without skipping the
//!    element swapped into the current slot
//! 4. Divide each accumulated sample by [`HEADROOM`] and clamp to i16
//!
//! The mixer runs on the audio thread under the device lock. It never waits on
//! a decode: chunk buffers are read with `try_lock`.
//!
//! Finished sounds are parked in a preallocated retire list. Their resource
//! activations are released by `release_finished` outside the audio thread,
//! so freeing chunk storage and logging never happen inside a callback.

use crate::audio::format::AudioFormat;
use crate::playback::handle::Voice;
use crate::resource::ChunkRead;
use parking_lot::Mutex;
use rtmix_common::Category;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed narrowing divisor. A sound's gain is expressed in the same unit, so
/// unity volume narrows back to the source amplitude.
pub const HEADROOM: i32 = 256;

/// Accumulation buffer size in device callback requests
const MIX_BUFFER_REQUESTS: usize = 4;

/// Finished sounds the retire list holds before it has to grow
const RETIRE_CAPACITY: usize = 64;

/// Mixer counters
///
/// **REAL-TIME SAFE**: updated with relaxed atomics only
#[derive(Debug, Default)]
pub struct MixerStats {
    /// Mix calls
    callbacks: AtomicU64,

    /// Pulls that returned not ready (underrun of one sound)
    stalled_reads: AtomicU64,

    /// Sounds that reached end of stream
    finished: AtomicU64,
}

impl MixerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            stalled_reads: self.stalled_reads.load(Ordering::Relaxed),
            finished_sounds: self.finished.load(Ordering::Relaxed),
            pool_exhaustions: 0,
        }
    }
}

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub callbacks: u64,
    pub stalled_reads: u64,
    pub finished_sounds: u64,
    /// Summed over all streaming resources
    pub pool_exhaustions: u64,
}

/// Outcome of mixing one sound for one block
enum VoiceOutcome {
    /// Produced its samples or stalled; stays in the list
    Keep,
    /// Reached end of stream
    Remove,
}

/// Per-category playing lists plus the accumulation buffer
pub struct Mixer {
    playing: [Vec<Arc<Voice>>; Category::COUNT],
    mix_buffer: Vec<i32>,

    /// Finished sounds whose activation is still held
    retired: Vec<Arc<Voice>>,

    stats: Arc<MixerStats>,
}

impl Mixer {
    pub fn new(format: &AudioFormat) -> Self {
        let mix_len = (MIX_BUFFER_REQUESTS * format.buffer_samples()).max(2) & !1;
        Self {
            playing: Default::default(),
            mix_buffer: vec![0; mix_len],
            retired: Vec::with_capacity(RETIRE_CAPACITY),
            stats: Arc::new(MixerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<MixerStats> {
        Arc::clone(&self.stats)
    }

    pub fn playing_count(&self, category: Category) -> usize {
        self.playing[category.index()].len()
    }

    pub fn total_playing(&self) -> usize {
        self.playing.iter().map(Vec::len).sum()
    }

    pub(crate) fn add(&mut self, voice: Arc<Voice>) {
        self.playing[voice.category().index()].push(voice);
    }

    /// Remove a sound by swap-with-last. Order of the list is not kept.
    pub(crate) fn remove(&mut self, voice: &Arc<Voice>) -> bool {
        let list = &mut self.playing[voice.category().index()];
        match list.iter().position(|v| Arc::ptr_eq(v, voice)) {
            Some(i) => {
                list.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// Finished sounds still holding their resource activation
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Exchange the retire list for `spare`, which should be empty
    fn swap_retired(&mut self, spare: Vec<Arc<Voice>>) -> Vec<Arc<Voice>> {
        std::mem::replace(&mut self.retired, spare)
    }

    /// Fill `output` with the mix of all playing sounds.
    ///
    /// Only whole frames are mixed; a trailing odd sample is set to silence.
    pub fn mix(&mut self, output: &mut [i16]) {
        self.stats.callbacks.fetch_add(1, Ordering::Relaxed);

        let (frames, tail) = output.split_at_mut(output.len() & !1);
        tail.fill(0);

        let block = self.mix_buffer.len();
        for out in frames.chunks_mut(block) {
            self.mix_block(out);
        }
    }

    fn mix_block(&mut self, output: &mut [i16]) {
        let acc = &mut self.mix_buffer[..output.len()];
        acc.fill(0);

        for list in self.playing.iter_mut() {
            let mut i = 0;
            while i < list.len() {
                // A sound stopped concurrently is skipped here; its stopper
                // removes it under the device lock
                let outcome = if list[i].is_playing() {
                    mix_voice(&list[i], acc, &self.stats)
                } else {
                    VoiceOutcome::Keep
                };

                match outcome {
                    VoiceOutcome::Keep => i += 1,
                    VoiceOutcome::Remove => {
                        // Re-examine index i: it now holds the former last element
                        let voice = list.swap_remove(i);
                        if voice.finish() {
                            voice.rewind();
                            self.retired.push(voice);
                            self.stats.finished.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }

        narrow(acc, output);
    }
}

/// Accumulate one sound into `acc`
fn mix_voice(voice: &Voice, acc: &mut [i32], stats: &MixerStats) -> VoiceOutcome {
    let gain = voice.gain();
    let mut written = 0;

    while written < acc.len() {
        let position = voice.position();

        match voice.resource().get_data(position, acc.len() - written) {
            ChunkRead::Pending => {
                stats.stalled_reads.fetch_add(1, Ordering::Relaxed);
                return VoiceOutcome::Keep;
            }
            ChunkRead::EndOfStream => {
                if voice.is_looping() && position > 0 {
                    voice.rewind();
                    continue;
                }
                return VoiceOutcome::Remove;
            }
            ChunkRead::Samples(view) => {
                let n = view.len();
                let dest = &mut acc[written..written + n];
                let mixed = view.with_samples(|samples| {
                    for (dst, &sample) in dest.iter_mut().zip(samples) {
                        *dst = dst.saturating_add(sample as i32 * gain);
                    }
                });

                if mixed.is_none() || n == 0 {
                    stats.stalled_reads.fetch_add(1, Ordering::Relaxed);
                    return VoiceOutcome::Keep;
                }

                written += n;
                voice.advance(n);
            }
        }
    }

    VoiceOutcome::Keep
}

/// Release the activations held by finished sounds.
///
/// Takes the device lock only to swap the retire list for a freshly allocated
/// one; the deactivations run after the lock is dropped. Returns how many
/// sounds were released.
pub(crate) fn release_finished(mixer: &Mutex<Mixer>) -> usize {
    let spare = Vec::with_capacity(RETIRE_CAPACITY);
    let finished = mixer.lock().swap_retired(spare);

    for voice in &finished {
        voice.resource().deactivate();
    }
    finished.len()
}

/// Divide by the headroom and clamp into the i16 range
pub fn narrow(acc: &[i32], output: &mut [i16]) {
    for (out, &value) in output.iter_mut().zip(acc) {
        *out = (value / HEADROOM).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_clamps_instead_of_wrapping() {
        let acc = [
            0,
            256 * 100,
            -256 * 100,
            256 * 40_000,
            -256 * 40_000,
            i32::MAX,
            i32::MIN,
        ];
        let mut out = [0i16; 7];
        narrow(&acc, &mut out);
        assert_eq!(out, [0, 100, -100, i16::MAX, i16::MIN, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_mix_buffer_is_four_requests() {
        let mixer = Mixer::new(&AudioFormat::stereo(48_000, 512));
        assert_eq!(mixer.mix_buffer.len(), 4 * 512 * 2);
    }

    #[test]
    fn test_empty_mixer_outputs_silence() {
        let mut mixer = Mixer::new(&AudioFormat::stereo(48_000, 64));
        let mut out = vec![7i16; 128];
        mixer.mix(&mut out);
        assert!(out.iter().all(|&s| s == 0));
        assert_eq!(mixer.stats().snapshot().callbacks, 1);
    }
}
