//! # rtmix audio engine (rtmix-engine)
//!
//! Streaming sound resources and a real-time mixer.
//!
//! **Purpose:** Decode sound files (fully up front, or chunk by chunk on
//! background workers), mix every playing sound per category into one
//! stereo i16 stream, and drive an output device through cpal.
//!
//! **Architecture:**
//! - [`audio`]: symphonia chunk loader, output format, cpal device binding
//! - [`resource`]: in-memory and streaming resources, chunk arena
//! - [`playback`]: playback handles, mixer, decode worker pool, audio manager

pub mod audio;
pub mod error;
pub mod playback;
pub mod resource;

pub use audio::AudioFormat;
pub use error::{Error, Result};
pub use playback::{AudioManager, PlaybackHandle, StatsSnapshot};
pub use resource::{ChunkRead, Resource, ResourceKey};
