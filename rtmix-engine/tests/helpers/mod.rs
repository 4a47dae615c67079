//! Test helper modules for rtmix-engine integration tests
//!
//! Provides reusable test infrastructure components:
//! - ManualExecutor: job submitter whose jobs run only when a test says so
//! - VecLoader / FailingLoader: in-memory decode backends
//! - Audio generator: deterministic WAV files via hound

#![allow(dead_code)]

pub mod audio_generator;
pub mod executor;
pub mod loaders;

pub use audio_generator::{generate_constant_wav, generate_ramp_wav};
pub use executor::ManualExecutor;
pub use loaders::{ramp_samples, FailingLoader, VecLoader};

use rtmix_common::config::StreamingConfig;
use rtmix_common::Category;
use rtmix_engine::audio::Loader;
use rtmix_engine::resource::{ResourceKey, StreamingResource};
use rtmix_engine::ChunkRead;
use std::sync::Arc;

/// Streaming resource over `loader`, scheduling on `jobs`
pub fn streaming_resource(
    key: ResourceKey,
    config: StreamingConfig,
    jobs: Arc<ManualExecutor>,
    loader: Arc<dyn Loader>,
) -> StreamingResource {
    StreamingResource::new(
        key,
        config,
        jobs,
        Box::new(move || -> rtmix_engine::Result<Arc<dyn Loader>> { Ok(Arc::clone(&loader)) }),
    )
}

pub fn music(id: i32) -> ResourceKey {
    ResourceKey::new(Category::Music, id)
}

/// Samples of a read, or panic with what came back instead
pub fn expect_samples(read: ChunkRead) -> Vec<i16> {
    match read {
        ChunkRead::Samples(view) => view
            .with_samples(|s| s.to_vec())
            .expect("Chunk buffer should not be locked"),
        ChunkRead::Pending => panic!("Expected samples, got Pending"),
        ChunkRead::EndOfStream => panic!("Expected samples, got EndOfStream"),
    }
}

pub fn is_pending(read: &ChunkRead) -> bool {
    matches!(read, ChunkRead::Pending)
}

pub fn is_end(read: &ChunkRead) -> bool {
    matches!(read, ChunkRead::EndOfStream)
}
