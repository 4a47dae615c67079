//! Audio manager
//!
//! Owns the output device, the mixer behind the device lock, the resource
//! table, and the decode job executor. Sounds are requested by
//! (category, id); each request yields a fresh [`PlaybackHandle`] sharing the
//! registered resource.

use crate::audio::format::AudioFormat;
use crate::audio::output::{self, CpalOutput, NullOutput, OutputDevice};
use crate::error::{Error, Result};
use crate::playback::handle::PlaybackHandle;
use crate::playback::jobs::{DecodeWorkerPool, JobSubmitter};
use crate::playback::mixer::{release_finished, Mixer, MixerStats, StatsSnapshot};
use crate::resource::{create_resource, Resource, ResourceKey};
use parking_lot::{Mutex, RwLock};
use rtmix_common::config::{StreamingConfig, TomlConfig};
use rtmix_common::{Category, ResourceDef};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Engine entry point
pub struct AudioManager {
    device: Box<dyn OutputDevice>,
    format: AudioFormat,

    /// Playing lists and mix buffer; this lock is the device-exclusive lock
    mixer: Arc<Mutex<Mixer>>,
    stats: Arc<MixerStats>,

    resources: RwLock<HashMap<ResourceKey, Arc<dyn Resource>>>,
    streaming: StreamingConfig,

    jobs: Arc<dyn JobSubmitter>,
    /// Set when the manager started its own workers
    workers: Option<Arc<DecodeWorkerPool>>,
}

impl AudioManager {
    /// Open the configured output device and start the decode workers.
    ///
    /// # Errors
    /// - `Error::Device` if no device can be opened (fatal at startup)
    pub fn new(config: &TomlConfig) -> Result<Self> {
        let desired = AudioFormat::from(&config.audio);
        let device = CpalOutput::open(config.audio.device.as_deref(), desired)?;

        let workers = Arc::new(DecodeWorkerPool::new(config.audio.decode_workers)?);
        let jobs: Arc<dyn JobSubmitter> = workers.clone();

        let mut manager = Self::with_device(Box::new(device), jobs, config.streaming)?;
        manager.workers = Some(workers);
        Ok(manager)
    }

    /// Manager without audio hardware. Mixing happens through [`render`](Self::render).
    pub fn headless(
        format: AudioFormat,
        jobs: Arc<dyn JobSubmitter>,
        streaming: StreamingConfig,
    ) -> Result<Self> {
        Self::with_device(Box::new(NullOutput::new(format)), jobs, streaming)
    }

    /// Bind to an already opened device and register the mix callback
    pub fn with_device(
        mut device: Box<dyn OutputDevice>,
        jobs: Arc<dyn JobSubmitter>,
        streaming: StreamingConfig,
    ) -> Result<Self> {
        streaming.validate()?;

        let format = device.format();
        let mixer = Mixer::new(&format);
        let stats = mixer.stats();
        let mixer = Arc::new(Mutex::new(mixer));

        let callback_mixer = Arc::clone(&mixer);
        device.start(Box::new(move |out: &mut [i16]| {
            callback_mixer.lock().mix(out);
        }))?;

        info!(
            "Audio manager ready on '{}': {} Hz, {} channels, {} frames per request",
            device.name(),
            format.sample_rate,
            format.channels,
            format.buffer_frames
        );

        Ok(Self {
            device,
            format,
            mixer,
            stats,
            resources: RwLock::new(HashMap::new()),
            streaming,
            jobs,
            workers: None,
        })
    }

    /// Register resources for definition records.
    ///
    /// Keys already registered are skipped. A definition that fails to load
    /// is logged and skipped. Returns the number of resources added.
    pub fn load_resources(&self, defs: &[ResourceDef]) -> usize {
        let mut added = 0;

        for def in defs {
            let key = ResourceKey::new(def.category, def.id);
            if self.resources.read().contains_key(&key) {
                debug!("Skipping duplicate sound definition {}", key);
                continue;
            }

            match create_resource(def, &self.streaming, Arc::clone(&self.jobs)) {
                Ok(resource) => {
                    if self.insert_resource(resource) {
                        added += 1;
                    }
                }
                Err(e) => warn!("Failed to load sound {} from {}: {}", key, def.path.display(), e),
            }
        }

        info!("Loaded {} of {} sound definitions", added, defs.len());
        added
    }

    /// Register a resource under its own key. Returns false if the key is taken.
    pub fn insert_resource(&self, resource: Arc<dyn Resource>) -> bool {
        let key = resource.key();
        let mut resources = self.resources.write();
        if resources.contains_key(&key) {
            return false;
        }
        resources.insert(key, resource);
        true
    }

    pub fn has_sound(&self, category: Category, id: i32) -> bool {
        self.resources
            .read()
            .contains_key(&ResourceKey::new(category, id))
    }

    /// New playback handle for a registered sound
    pub fn get_sound(&self, category: Category, id: i32) -> Result<PlaybackHandle> {
        self.collect_finished();

        let resource = self
            .resources
            .read()
            .get(&ResourceKey::new(category, id))
            .cloned()
            .ok_or(Error::ResourceNotFound { category, id })?;

        Ok(PlaybackHandle::new(resource, Arc::clone(&self.mixer)))
    }

    /// Mix into `output` (interleaved stereo). Same path as the device callback.
    ///
    /// Sounds that finish here keep their resource activation until
    /// [`collect_finished`](Self::collect_finished) runs.
    pub fn render(&self, output: &mut [i16]) {
        self.mixer.lock().mix(output);
    }

    /// Release the resources of sounds the mixer finished.
    ///
    /// Called by `get_sound`, `stats` and every handle's `play`/`stop`; a
    /// caller that only polls should call it periodically. Returns how many
    /// sounds were released.
    pub fn collect_finished(&self) -> usize {
        let released = release_finished(&self.mixer);
        if released > 0 {
            debug!("Released {} finished sounds", released);
        }
        released
    }

    pub fn pause(&mut self, paused: bool) -> Result<()> {
        self.device.pause(paused)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn device_name(&self) -> String {
        self.device.name()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.collect_finished();

        let mut snapshot = self.stats.snapshot();
        snapshot.pool_exhaustions = self
            .resources
            .read()
            .values()
            .map(|r| r.pool_exhaustions())
            .sum();
        snapshot
    }

    pub fn playing_count(&self, category: Category) -> usize {
        self.mixer.lock().playing_count(category)
    }

    pub fn total_playing(&self) -> usize {
        self.mixer.lock().total_playing()
    }

    /// Output devices on the default driver
    pub fn devices() -> Result<Vec<String>> {
        output::list_devices()
    }

    /// Available audio drivers
    pub fn drivers() -> Vec<String> {
        output::list_drivers()
    }

    /// Driver in use
    pub fn current_driver() -> String {
        output::current_driver()
    }

    /// Close the device and stop the decode workers
    pub fn shutdown(&mut self) {
        self.device.close();
        self.collect_finished();
        if let Some(workers) = self.workers.take() {
            workers.shutdown();
        }
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
