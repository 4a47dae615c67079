//! Playback handles
//!
//! A [`PlaybackHandle`] is one play request for a resource. Handles are cheap
//! to clone; clones control the same sound. The mixer keeps the shared
//! [`Voice`] state in its per-category playing list while the sound plays.

use crate::error::Result;
use crate::playback::mixer::{release_finished, Mixer, HEADROOM};
use crate::resource::{Resource, ResourceKey};
use parking_lot::Mutex;
use rtmix_common::Category;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Highest accepted volume
pub const MAX_VOLUME: f32 = 4.0;

/// Per-sound state shared between a handle and the mixer
pub(crate) struct Voice {
    resource: Arc<dyn Resource>,
    category: Category,

    /// Read position in interleaved samples
    position: AtomicUsize,

    /// True while holding an activation of `resource`
    playing: AtomicBool,

    looping: AtomicBool,

    /// Fixed-point gain, `HEADROOM` == 1.0
    gain: AtomicI32,
}

impl Voice {
    fn new(resource: Arc<dyn Resource>) -> Self {
        Self {
            category: resource.category(),
            resource,
            position: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            gain: AtomicI32::new(HEADROOM),
        }
    }

    pub(crate) fn resource(&self) -> &dyn Resource {
        self.resource.as_ref()
    }

    pub(crate) fn category(&self) -> Category {
        self.category
    }

    pub(crate) fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self, samples: usize) {
        self.position.fetch_add(samples, Ordering::AcqRel);
    }

    /// Explicit jump back to the start (loop restart, replay)
    pub(crate) fn rewind(&self) {
        self.position.store(0, Ordering::Release);
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub(crate) fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub(crate) fn gain(&self) -> i32 {
        self.gain.load(Ordering::Acquire)
    }

    /// Leave the playing state.
    ///
    /// Returns true for exactly one caller per play; that caller releases the
    /// activation.
    pub(crate) fn finish(&self) -> bool {
        self.playing
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Control handle for one sound
#[derive(Clone)]
pub struct PlaybackHandle {
    voice: Arc<Voice>,
    mixer: Arc<Mutex<Mixer>>,
}

impl PlaybackHandle {
    pub(crate) fn new(resource: Arc<dyn Resource>, mixer: Arc<Mutex<Mixer>>) -> Self {
        Self {
            voice: Arc::new(Voice::new(resource)),
            mixer,
        }
    }

    /// Start playback from the current position.
    ///
    /// Activates the resource and adds the sound to its category's playing
    /// list. Calling `play` on a playing handle does nothing.
    pub fn play(&self) -> Result<()> {
        release_finished(&self.mixer);

        if self
            .voice
            .playing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        if let Err(e) = self.voice.resource.activate() {
            self.voice.playing.store(false, Ordering::Release);
            return Err(e);
        }

        self.mixer.lock().add(Arc::clone(&self.voice));
        debug!("Playing {} from sample {}", self.key(), self.position());
        Ok(())
    }

    /// Stop playback, keeping the position. No effect if not playing.
    pub fn stop(&self) {
        release_finished(&self.mixer);

        if !self.voice.finish() {
            return;
        }

        self.mixer.lock().remove(&self.voice);
        self.voice.resource.deactivate();
        debug!("Stopped {} at sample {}", self.key(), self.position());
    }

    pub fn is_playing(&self) -> bool {
        self.voice.is_playing()
    }

    /// Read position in interleaved samples
    pub fn position(&self) -> usize {
        self.voice.position()
    }

    pub fn category(&self) -> Category {
        self.voice.category
    }

    pub fn key(&self) -> ResourceKey {
        self.voice.resource.key()
    }

    /// Restart from the beginning at end of stream instead of finishing
    pub fn set_looping(&self, looping: bool) {
        self.voice.looping.store(looping, Ordering::Release);
    }

    pub fn is_looping(&self) -> bool {
        self.voice.is_looping()
    }

    /// Set the volume (1.0 = source amplitude), clamped to `0.0..=MAX_VOLUME`
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, MAX_VOLUME) };
        let gain = (volume * HEADROOM as f32).round() as i32;
        self.voice.gain.store(gain, Ordering::Release);
    }

    pub fn volume(&self) -> f32 {
        self.voice.gain() as f32 / HEADROOM as f32
    }
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("key", &self.key())
            .field("position", &self.position())
            .field("playing", &self.is_playing())
            .finish()
    }
}
