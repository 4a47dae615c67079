//! Fully decoded resource

use super::{ChunkRead, Resource, ResourceKey, SampleView};
use crate::audio::loader::{open_loader, read_to_end};
use crate::error::Result;
use rtmix_common::ResourceDef;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resource decoded once at load time and kept resident.
///
/// Activation is only counted; there is no decode state to allocate.
pub struct InMemoryResource {
    key: ResourceKey,
    samples: Arc<[i16]>,
    activations: AtomicUsize,
}

impl InMemoryResource {
    pub fn new(key: ResourceKey, samples: Vec<i16>) -> Self {
        Self {
            key,
            samples: Arc::from(samples),
            activations: AtomicUsize::new(0),
        }
    }

    /// Decode the whole file named by `def`
    pub fn load(def: &ResourceDef, chunk_size: usize) -> Result<Self> {
        let loader = open_loader(&def.path, def.format)?;
        let samples = read_to_end(loader.as_ref(), chunk_size)?;

        let key = ResourceKey::new(def.category, def.id);
        debug!(
            "Decoded {} into memory: {} samples from {}",
            key,
            samples.len(),
            def.path.display()
        );

        Ok(Self::new(key, samples))
    }

    /// Interleaved stereo sample count
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::Acquire)
    }
}

impl Resource for InMemoryResource {
    fn key(&self) -> ResourceKey {
        self.key
    }

    fn activate(&self) -> Result<()> {
        self.activations.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn deactivate(&self) {
        let result = self
            .activations
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if result.is_err() {
            warn!("Deactivate on inactive resource {}", self.key);
        }
    }

    fn get_data(&self, position: usize, length: usize) -> ChunkRead {
        if position >= self.samples.len() {
            return ChunkRead::EndOfStream;
        }

        let end = self.samples.len().min(position + length);
        ChunkRead::Samples(SampleView::Memory {
            samples: Arc::clone(&self.samples),
            range: position..end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtmix_common::Category;

    fn resource() -> InMemoryResource {
        InMemoryResource::new(ResourceKey::new(Category::Game, 1), (0..10).collect())
    }

    #[test]
    fn test_get_data_truncates_at_end() {
        let res = resource();
        match res.get_data(6, 100) {
            ChunkRead::Samples(view) => {
                assert_eq!(view.with_samples(|s| s.to_vec()), Some(vec![6, 7, 8, 9]));
            }
            _ => panic!("Expected samples"),
        }
        assert!(matches!(res.get_data(10, 4), ChunkRead::EndOfStream));
    }

    #[test]
    fn test_activation_count_never_underflows() {
        let res = resource();
        res.activate().unwrap();
        res.deactivate();
        res.deactivate();
        assert_eq!(res.activations(), 0);
    }
}
