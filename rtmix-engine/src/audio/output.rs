//! Audio output using cpal
//!
//! Manages the output device and its callback-driven stream. The engine renders
//! interleaved stereo i16; the stream callback converts to whatever sample
//! type and channel count the device negotiated.
//!
//! Device open failure, or a host with zero output devices, is fatal at
//! startup.

use crate::audio::format::AudioFormat;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Render callback. Must fill the whole slice with interleaved stereo samples.
pub type RenderCallback = Box<dyn FnMut(&mut [i16]) + Send + 'static>;

/// Output device binding
pub trait OutputDevice {
    /// Negotiated format
    fn format(&self) -> AudioFormat;

    /// Human-readable device name
    fn name(&self) -> String;

    /// Register the render callback and start the stream
    fn start(&mut self, callback: RenderCallback) -> Result<()>;

    fn pause(&mut self, paused: bool) -> Result<()>;

    /// Stop the stream and release the callback
    fn close(&mut self);
}

/// List available audio output devices on the default host
pub fn list_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::Device(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .collect();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}

/// Audio drivers (cpal hosts) compiled in and available on this system
pub fn list_drivers() -> Vec<String> {
    cpal::available_hosts()
        .into_iter()
        .map(|id| id.name().to_string())
        .collect()
}

/// Driver used for output
pub fn current_driver() -> String {
    cpal::default_host().id().name().to_string()
}

/// cpal-backed output device
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    format: AudioFormat,
    stream: Option<Stream>,
    /// Stream error flag - set by the error callback
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl CpalOutput {
    /// Open an output device and negotiate a format close to `desired`.
    ///
    /// # Fallback Behavior
    /// A named device that cannot be found falls back to the default device.
    ///
    /// # Errors
    /// - No output devices at all
    /// - No default device
    /// - Failed to query supported configurations
    pub fn open(device_name: Option<&str>, desired: AudioFormat) -> Result<Self> {
        let host = cpal::default_host();

        let mut devices: Vec<Device> = host
            .output_devices()
            .map_err(|e| Error::Device(format!("Failed to enumerate devices: {}", e)))?
            .collect();

        if devices.is_empty() {
            return Err(Error::Device("No audio output devices found".to_string()));
        }

        let requested = device_name.and_then(|name| {
            let index = devices
                .iter()
                .position(|d| d.name().ok().as_deref() == Some(name));
            if index.is_none() {
                warn!("Requested device '{}' not found, falling back to default device", name);
            }
            index.map(|i| devices.swap_remove(i))
        });

        let device = match requested {
            Some(dev) => dev,
            None => host
                .default_output_device()
                .ok_or_else(|| Error::Device("No default output device found".to_string()))?,
        };

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", name);

        let (config, sample_format) = Self::get_best_config(&device, &desired)?;

        let buffer_frames = match config.buffer_size {
            cpal::BufferSize::Fixed(frames) => frames,
            cpal::BufferSize::Default => desired.buffer_frames,
        };
        let format = AudioFormat::stereo(config.sample_rate.0, buffer_frames);

        if format.sample_rate != desired.sample_rate {
            warn!(
                "Device runs at {} Hz instead of {} Hz; sounds play without resampling",
                format.sample_rate, desired.sample_rate
            );
        }

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        Ok(Self {
            device,
            config,
            sample_format,
            format,
            stream: None,
            error_flag: Arc::new(AtomicBool::new(false)),
            error_count: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Pick a supported configuration for playback.
    ///
    /// Prefers stereo at the desired rate, i16 over f32 over u16. Falls back to
    /// the device default.
    fn get_best_config(device: &Device, desired: &AudioFormat) -> Result<(StreamConfig, SampleFormat)> {
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::Device(format!("Failed to get device configs: {}", e)))?
            .collect();

        let rate = desired.sample_rate;
        let preferred = [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16]
            .into_iter()
            .find_map(|sample_format| {
                supported.iter().find(|config| {
                    config.channels() == desired.channels
                        && config.min_sample_rate().0 <= rate
                        && config.max_sample_rate().0 >= rate
                        && config.sample_format() == sample_format
                })
            });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let buffer_size = match supported_config.buffer_size() {
                cpal::SupportedBufferSize::Range { min, max }
                    if (*min..=*max).contains(&desired.buffer_frames) =>
                {
                    cpal::BufferSize::Fixed(desired.buffer_frames)
                }
                _ => cpal::BufferSize::Default,
            };

            let mut config = supported_config
                .clone()
                .with_sample_rate(cpal::SampleRate(rate))
                .config();
            config.buffer_size = buffer_size;
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::Device(format!("Failed to get default config: {}", e)))?;

        let sample_format = supported_config.sample_format();
        Ok((supported_config.config(), sample_format))
    }

    /// Build the output stream for device sample type `T`
    fn build_stream<T>(&self, mut callback: RenderCallback) -> Result<Stream>
    where
        T: SizedSample + FromSample<i16> + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let error_flag = Arc::clone(&self.error_flag);
        let error_count = Arc::clone(&self.error_count);

        // Stereo render target; only grows if the device asks for more than planned
        let mut scratch: Vec<i16> = vec![0; self.format.buffer_samples()];

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    if scratch.len() < frames * 2 {
                        scratch.resize(frames * 2, 0);
                    }
                    let stereo = &mut scratch[..frames * 2];
                    callback(stereo);

                    for (out, frame) in data.chunks_mut(channels).zip(stereo.chunks_exact(2)) {
                        if channels == 1 {
                            let mono = (frame[0] as i32 + frame[1] as i32) / 2;
                            out[0] = T::from_sample(mono as i16);
                            continue;
                        }
                        out[0] = T::from_sample(frame[0]);
                        out[1] = T::from_sample(frame[1]);
                        for extra in out.iter_mut().skip(2) {
                            *extra = T::EQUILIBRIUM;
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                    error_count.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::Device(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }

    /// Check if an audio stream error has occurred
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    /// Stream errors since open
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    /// Device channel count (the engine always renders stereo)
    pub fn device_channels(&self) -> u16 {
        self.config.channels
    }
}

impl OutputDevice for CpalOutput {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    fn start(&mut self, callback: RenderCallback) -> Result<()> {
        info!("Starting audio stream");

        let stream = match self.sample_format {
            SampleFormat::I16 => self.build_stream::<i16>(callback)?,
            SampleFormat::F32 => self.build_stream::<f32>(callback)?,
            SampleFormat::U16 => self.build_stream::<u16>(callback)?,
            sample_format => {
                return Err(Error::Device(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::Device(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        info!("Audio stream started");
        Ok(())
    }

    fn pause(&mut self, paused: bool) -> Result<()> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(());
        };

        let result = if paused {
            stream.pause().map_err(|e| e.to_string())
        } else {
            stream.play().map_err(|e| e.to_string())
        };
        result.map_err(|e| Error::Device(format!("Failed to change stream state: {}", e)))?;
        debug!("Audio stream {}", if paused { "paused" } else { "resumed" });
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream");
            if let Err(e) = stream.pause() {
                warn!("Failed to pause stream on close: {}", e);
            }
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Output without hardware. The owner drives mixing through `AudioManager::render`.
pub struct NullOutput {
    format: AudioFormat,
    callback: Mutex<Option<RenderCallback>>,
    paused: AtomicBool,
}

impl NullOutput {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            callback: Mutex::new(None),
            paused: AtomicBool::new(false),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Run the registered callback once, as a device would. Returns false
    /// while paused or before start.
    pub fn pump(&self, output: &mut [i16]) -> bool {
        if self.is_paused() {
            return false;
        }
        match self.callback.lock().as_mut() {
            Some(callback) => {
                callback(output);
                true
            }
            None => false,
        }
    }
}

impl OutputDevice for NullOutput {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn name(&self) -> String {
        "null".to_string()
    }

    fn start(&mut self, callback: RenderCallback) -> Result<()> {
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    fn pause(&mut self, paused: bool) -> Result<()> {
        self.paused.store(paused, Ordering::Release);
        Ok(())
    }

    fn close(&mut self) {
        self.callback.lock().take();
    }
}
