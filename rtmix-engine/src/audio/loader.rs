//! Chunk loader using symphonia
//!
//! Decodes a sound file at an arbitrary frame offset into a caller-supplied
//! buffer of interleaved stereo i16 samples.
//!
//! # Supported Formats
//!
//! Per Cargo.toml symphonia features: WAV/PCM, FLAC, MP3, Vorbis (Ogg),
//! AAC (MP4/M4A).
//!
//! # Sample Format
//!
//! - Output: Stereo i16 samples (interleaved: [L, R, L, R, ...])
//! - Mono files: expanded to stereo in place
//! - Multi-channel: first two channels kept

use crate::error::{Error, Result};
use parking_lot::Mutex;
use rtmix_common::SoundFormat;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Format-specific decode backend.
///
/// `load_chunk` fills `dest` (its length is the capacity in interleaved stereo
/// samples) starting at `frame_offset`, and returns the number of samples
/// written. 0 means the offset is at or past the end of the stream.
///
/// Implementations serialize their own seek+decode sequence, so calls from
/// several worker threads on one loader run one at a time.
pub trait Loader: Send + Sync {
    fn load_chunk(&self, dest: &mut [i16], frame_offset: u64) -> Result<usize>;
}

/// Expand `mono_len` mono samples at the start of `buf` into interleaved stereo.
///
/// Walks backward from the end so a write never clobbers a source sample that
/// has not been read yet. `buf` must hold at least `2 * mono_len` samples.
pub fn upmix_mono_in_place(buf: &mut [i16], mono_len: usize) {
    debug_assert!(buf.len() >= mono_len * 2);

    for i in (0..mono_len).rev() {
        let sample = buf[i];
        buf[2 * i] = sample;
        buf[2 * i + 1] = sample;
    }
}

/// Decode an entire stream through a loader
pub fn read_to_end(loader: &dyn Loader, chunk_samples: usize) -> Result<Vec<i16>> {
    let chunk_samples = chunk_samples.max(2) & !1;
    let mut samples = Vec::new();
    let mut chunk = vec![0i16; chunk_samples];
    let mut frame_offset = 0u64;

    loop {
        let written = loader.load_chunk(&mut chunk, frame_offset)?;
        if written == 0 {
            break;
        }
        samples.extend_from_slice(&chunk[..written]);
        frame_offset += (written / 2) as u64;
    }

    Ok(samples)
}

/// Open the decode backend for a sound file
pub fn open_loader(path: &Path, format: SoundFormat) -> Result<Arc<dyn Loader>> {
    Ok(Arc::new(SymphoniaLoader::open(path, format)?))
}

/// Decoder state guarded by the loader mutex
struct DecodeState {
    /// Symphonia format reader
    format: Box<dyn FormatReader>,

    /// Symphonia decoder
    decoder: Box<dyn Decoder>,

    /// Track being decoded
    track_id: u32,

    /// Total frames if the container reports them
    n_frames: Option<u64>,

    /// Samples kept per frame (1 for mono, 2 otherwise)
    kept_channels: usize,

    /// Decoded frames not yet handed out, `kept_channels` samples each
    pending: Vec<i16>,

    /// Frame index of `pending[0]`
    pending_start: u64,

    /// Frames before this index are discarded after a seek
    skip_until: u64,

    /// False after an error; the next load seeks explicitly
    positioned: bool,

    /// Conversion scratch, reused across packets
    sample_buf: Option<SampleBuffer<i16>>,
    sample_buf_frames: usize,
}

impl DecodeState {
    fn pending_frames(&self) -> usize {
        self.pending.len() / self.kept_channels
    }

    fn pending_end(&self) -> u64 {
        self.pending_start + self.pending_frames() as u64
    }

    /// Move the stream so the next handed-out frame is `frame_offset`.
    ///
    /// Returns false when the offset lies past the end of the stream.
    fn position_at(&mut self, frame_offset: u64, path: &Path) -> Result<bool> {
        if self.positioned
            && frame_offset >= self.pending_start
            && frame_offset <= self.pending_end()
        {
            // Sequential read, or inside frames decoded for the previous chunk
            let drop = (frame_offset - self.pending_start) as usize * self.kept_channels;
            self.pending.drain(..drop);
            self.pending_start = frame_offset;
            return Ok(true);
        }

        if let Some(total) = self.n_frames {
            if frame_offset >= total {
                return Ok(false);
            }
        }

        let seek = self.format.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts: frame_offset,
                track_id: self.track_id,
            },
        );

        match seek {
            Ok(seeked) => {
                debug!(
                    "Seeked {} to frame {} (landed at {})",
                    path.display(),
                    seeked.required_ts,
                    seeked.actual_ts
                );
            }
            Err(SymphoniaError::SeekError(SeekErrorKind::OutOfRange)) => return Ok(false),
            Err(e) => {
                self.positioned = false;
                return Err(Error::Decode(format!(
                    "Seek to frame {} failed in {}: {}",
                    frame_offset,
                    path.display(),
                    e
                )));
            }
        }

        self.decoder.reset();
        self.pending.clear();
        self.pending_start = frame_offset;
        self.skip_until = frame_offset;
        self.positioned = true;
        Ok(true)
    }

    /// Decode the next packet of our track into `pending`.
    ///
    /// Returns false at end of stream.
    fn decode_next(&mut self, path: &Path) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Stream reset required in {}, treating as end", path.display());
                    return Ok(false);
                }
                Err(e) => {
                    self.positioned = false;
                    return Err(Error::Decode(format!(
                        "Error reading packet from {}: {}",
                        path.display(),
                        e
                    )));
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let packet_ts = packet.ts();

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    // Corrupt packet: drop it and keep going
                    warn!("Decode error in {}: {}", path.display(), msg);
                    continue;
                }
                Err(e) => {
                    self.positioned = false;
                    return Err(Error::Decode(format!(
                        "Decoder failure in {}: {}",
                        path.display(),
                        e
                    )));
                }
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let source_channels = spec.channels.count().max(1);

            if self.sample_buf.is_none() || self.sample_buf_frames < decoded.capacity() {
                self.sample_buf = Some(SampleBuffer::<i16>::new(decoded.capacity() as u64, spec));
                self.sample_buf_frames = decoded.capacity();
            }
            let Some(sample_buf) = self.sample_buf.as_mut() else {
                continue;
            };
            sample_buf.copy_interleaved_ref(decoded);

            let skip = self.skip_until.saturating_sub(packet_ts).min(frames as u64) as usize;
            if self.pending.is_empty() {
                self.pending_start = packet_ts + skip as u64;
            }

            let kept = self.kept_channels;
            for frame in sample_buf
                .samples()
                .chunks_exact(source_channels)
                .take(frames)
                .skip(skip)
            {
                for channel in 0..kept {
                    self.pending.push(frame[channel.min(source_channels - 1)]);
                }
            }

            return Ok(true);
        }
    }
}

/// Symphonia-backed loader. One instance per activated streaming resource.
pub struct SymphoniaLoader {
    path: PathBuf,
    sample_rate: u32,
    channels: usize,
    state: Mutex<DecodeState>,
}

impl SymphoniaLoader {
    /// Open a sound file and prepare its decoder.
    ///
    /// # Errors
    /// - Failed to open file
    /// - Unsupported audio format
    /// - No decodable audio track
    pub fn open(path: &Path, format: SoundFormat) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::Decode(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // The definition's format drives format detection; the real extension is a fallback
        let mut hint = Hint::new();
        hint.with_extension(format.extension());

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| {
                Error::Decode(format!("Failed to probe format of {}: {}", path.display(), e))
            })?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode(format!("No audio track found in {}", path.display())))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params.sample_rate.unwrap_or(48_000);
        let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| {
                Error::Decode(format!("Failed to create decoder for {}: {}", path.display(), e))
            })?;

        debug!(
            "Opened {}: format={:?}, sample_rate={}, channels={}, frames={:?}",
            path.display(),
            format,
            sample_rate,
            channels,
            codec_params.n_frames
        );

        Ok(Self {
            path: path.to_path_buf(),
            sample_rate,
            channels,
            state: Mutex::new(DecodeState {
                format: reader,
                decoder,
                track_id,
                n_frames: codec_params.n_frames,
                kept_channels: if channels == 1 { 1 } else { 2 },
                pending: Vec::new(),
                pending_start: 0,
                skip_until: 0,
                positioned: true,
                sample_buf: None,
                sample_buf_frames: 0,
            }),
        })
    }

    /// Native sample rate of the source
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Native channel count of the source
    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl Loader for SymphoniaLoader {
    fn load_chunk(&self, dest: &mut [i16], frame_offset: u64) -> Result<usize> {
        let capacity_frames = dest.len() / 2;
        if capacity_frames == 0 {
            return Ok(0);
        }

        let mut state = self.state.lock();
        if !state.position_at(frame_offset, &self.path)? {
            return Ok(0);
        }

        let kept = state.kept_channels;
        let mut written = 0usize;

        loop {
            let available = state.pending_frames();
            if available > 0 {
                let n = available.min(capacity_frames - written);
                let region = &mut dest[written * 2..(written + n) * 2];

                if kept == 2 {
                    region.copy_from_slice(&state.pending[..n * 2]);
                } else {
                    region[..n].copy_from_slice(&state.pending[..n]);
                    upmix_mono_in_place(region, n);
                }

                state.pending.drain(..n * kept);
                state.pending_start += n as u64;
                written += n;
            }

            if written == capacity_frames {
                break;
            }

            if !state.decode_next(&self.path)? {
                break;
            }
        }

        Ok(written * 2)
    }
}
