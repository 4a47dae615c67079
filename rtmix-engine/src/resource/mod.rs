//! Sound resources
//!
//! A resource is the shared, decoded side of a sound, keyed by
//! (category, id). Every playback handle for that key reads through the same
//! resource. Activation is reference counted: each playing handle holds one
//! activation, and streaming resources only keep chunk storage and a decoder
//! while at least one activation is outstanding.

pub mod chunk;
pub mod in_memory;
pub mod streaming;

use crate::error::Result;
use crate::playback::jobs::JobSubmitter;
use chunk::ChunkArena;
use rtmix_common::config::StreamingConfig;
use rtmix_common::{Category, LoaderPolicy, ResourceDef};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

pub use in_memory::InMemoryResource;
pub use streaming::StreamingResource;

/// Unique identity of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub category: Category,
    pub id: i32,
}

impl ResourceKey {
    pub fn new(category: Category, id: i32) -> Self {
        Self { category, id }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.id)
    }
}

impl std::str::FromStr for ResourceKey {
    type Err = rtmix_common::Error;

    /// Parse `category:id`, e.g. `music:1`
    fn from_str(s: &str) -> rtmix_common::Result<Self> {
        let (category, id) = s.split_once(':').ok_or_else(|| {
            rtmix_common::Error::InvalidInput(format!("Expected category:id, got '{}'", s))
        })?;
        let id = id.trim().parse::<i32>().map_err(|e| {
            rtmix_common::Error::InvalidInput(format!("Invalid sound id '{}': {}", id, e))
        })?;
        Ok(Self::new(category.trim().parse()?, id))
    }
}

/// Samples handed to the mixer by one `get_data` call
pub enum SampleView {
    /// Range of a Ready chunk in a streaming arena
    Chunk {
        arena: Arc<ChunkArena>,
        slot: usize,
        range: Range<usize>,
    },
    /// Range of a fully decoded resource
    Memory {
        samples: Arc<[i16]>,
        range: Range<usize>,
    },
}

impl SampleView {
    /// Number of interleaved samples in the view
    pub fn len(&self) -> usize {
        match self {
            SampleView::Chunk { range, .. } | SampleView::Memory { range, .. } => range.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over the samples.
    ///
    /// Never blocks. Returns `None` if a decode currently holds the chunk buffer.
    pub fn with_samples<R>(&self, f: impl FnOnce(&[i16]) -> R) -> Option<R> {
        match self {
            SampleView::Chunk { arena, slot, range } => {
                let buffer = arena.slot(*slot).try_read()?;
                Some(f(&buffer[range.clone()]))
            }
            SampleView::Memory { samples, range } => Some(f(&samples[range.clone()])),
        }
    }
}

/// Result of a pull from a resource
pub enum ChunkRead {
    /// Data is being decoded; retry on a later callback
    Pending,
    /// No data at or after the requested position
    EndOfStream,
    Samples(SampleView),
}

/// Shared decoded sound, pulled by the mixer
pub trait Resource: Send + Sync {
    fn key(&self) -> ResourceKey;

    fn category(&self) -> Category {
        self.key().category
    }

    /// Take one activation. The first allocates any decode state.
    fn activate(&self) -> Result<()>;

    /// Release one activation. The last frees any decode state.
    fn deactivate(&self);

    /// Pull up to `length` interleaved samples starting at sample `position`
    fn get_data(&self, position: usize, length: usize) -> ChunkRead;

    /// Times a chunk was needed while every slot was busy
    fn pool_exhaustions(&self) -> u64 {
        0
    }
}

/// Build the resource described by a definition record
pub fn create_resource(
    def: &ResourceDef,
    streaming: &StreamingConfig,
    jobs: Arc<dyn JobSubmitter>,
) -> Result<Arc<dyn Resource>> {
    let resource: Arc<dyn Resource> = match def.policy {
        LoaderPolicy::InMemory => Arc::new(InMemoryResource::load(def, streaming.chunk_size)?),
        LoaderPolicy::Streaming => Arc::new(StreamingResource::from_def(def, *streaming, jobs)),
    };
    Ok(resource)
}
