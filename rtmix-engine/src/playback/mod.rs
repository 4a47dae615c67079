//! Playback: handles, mixing, background jobs, and the audio manager

pub mod handle;
pub mod jobs;
pub mod manager;
pub mod mixer;

pub use handle::PlaybackHandle;
pub use jobs::{DecodeWorkerPool, Job, JobPriority, JobSubmitter};
pub use manager::AudioManager;
pub use mixer::{Mixer, MixerStats, StatsSnapshot, HEADROOM};
