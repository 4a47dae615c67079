//! Chunk-streamed resource
//!
//! A streaming resource decodes its file in fixed-size chunks on background
//! workers. The mixer pulls through [`StreamingResource::get_data`], which maps
//! the read position to a logical chunk index, returns data when that chunk is
//! Ready, and keeps the next `preload_window` chunks scheduled.
//!
//! **Pool:** `max_chunks` slots per activation. A slot is always either in the
//! free list or in the index map, never both. Several handles may read one
//! resource at different positions, so the resource remembers the chunk index
//! of the last read of each active reader. A chunk that is some reader's
//! current chunk or inside its preload window is protected. When the free list
//! is empty a slot is reclaimed from an unprotected chunk behind a reader;
//! demand loads may also reclaim the furthest unprotected chunk ahead. Loading
//! chunks are never reclaimed.
//!
//! **Teardown:** decode jobs own a clone of the arena. The last deactivation
//! retires the arena and drops the resource's reference, so a late completion
//! only ever writes into storage it keeps alive itself.

use super::chunk::{ChunkArena, ChunkState};
use super::{ChunkRead, Resource, ResourceKey, SampleView};
use crate::audio::loader::{open_loader, Loader};
use crate::error::{Error, Result};
use crate::playback::jobs::{JobPriority, JobSubmitter};
use parking_lot::Mutex;
use rtmix_common::config::StreamingConfig;
use rtmix_common::ResourceDef;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens a fresh loader on first activation
pub type LoaderFactory = Box<dyn Fn() -> Result<Arc<dyn Loader>> + Send + Sync>;

/// Upper bound on the readers whose positions protect chunks
const RECENT_READS: usize = 16;

/// Chunk indices of the most recent reads, newest last
#[derive(Debug, Default)]
struct RecentReads {
    indices: [usize; RECENT_READS],
    next: usize,
    len: usize,
}

impl RecentReads {
    fn record(&mut self, index: usize) {
        self.indices[self.next] = index;
        self.next = (self.next + 1) % RECENT_READS;
        self.len = (self.len + 1).min(RECENT_READS);
    }

    /// The last `count` recorded indices, newest first
    fn last(&self, count: usize) -> impl Iterator<Item = usize> + '_ {
        (1..=count.min(self.len))
            .map(move |back| self.indices[(self.next + RECENT_READS - back) % RECENT_READS])
    }
}

/// Decode state that exists only while activated
struct StreamState {
    arena: Arc<ChunkArena>,

    /// Unmapped slots, reused oldest first
    free: VecDeque<usize>,

    /// Logical chunk index -> slot
    mapping: HashMap<usize, usize>,

    loader: Arc<dyn Loader>,

    /// Every playing handle reads once per callback, so the last
    /// `activations` reads give each reader's current chunk
    recent: RecentReads,

    activations: usize,
}

impl StreamState {
    fn new(config: &StreamingConfig, loader: Arc<dyn Loader>) -> Self {
        Self {
            arena: Arc::new(ChunkArena::new(config.max_chunks, config.chunk_size)),
            free: (0..config.max_chunks).collect(),
            mapping: HashMap::with_capacity(config.max_chunks),
            loader,
            recent: RecentReads::default(),
            activations: 1,
        }
    }

    fn state_of(&self, slot: usize) -> ChunkState {
        self.arena.slot(slot).state()
    }

    /// Find a slot for a new chunk.
    ///
    /// Order: free list, then the lowest unprotected chunk behind any reader,
    /// then (demand loads only) the highest unprotected chunk ahead of every
    /// reader. A chunk is protected when it lies within `window` chunks from
    /// a reader's current chunk.
    fn acquire_slot(&mut self, window: usize, demand: bool) -> Option<usize> {
        if let Some(slot) = self.free.pop_front() {
            return Some(slot);
        }

        let readers = self.activations.max(1);
        let protected = |index: usize| {
            self.recent
                .last(readers)
                .any(|r| r <= index && index <= r.saturating_add(window))
        };
        let behind_reader = |index: usize| self.recent.last(readers).any(|r| index < r);

        let candidates = self
            .mapping
            .iter()
            .filter(|(&index, &slot)| self.state_of(slot) != ChunkState::Loading && !protected(index))
            .map(|(&index, &slot)| (index, slot));

        let behind = candidates
            .clone()
            .filter(|&(index, _)| behind_reader(index))
            .min_by_key(|&(index, _)| index);

        let victim = match behind {
            Some(victim) => victim,
            None if demand => candidates.max_by_key(|&(index, _)| index)?,
            None => return None,
        };

        self.mapping.remove(&victim.0);
        Some(victim.1)
    }
}

/// Resource decoded chunk by chunk while playing
pub struct StreamingResource {
    key: ResourceKey,
    config: StreamingConfig,
    open_loader: LoaderFactory,
    jobs: Arc<dyn JobSubmitter>,
    state: Mutex<Option<StreamState>>,
    pool_exhaustions: AtomicU64,

    /// Decode jobs the executor refused during the current activation
    failed_submissions: AtomicU64,
}

impl StreamingResource {
    /// Create an inactive resource. `open_loader` runs on every first activation.
    pub fn new(
        key: ResourceKey,
        config: StreamingConfig,
        jobs: Arc<dyn JobSubmitter>,
        open_loader: LoaderFactory,
    ) -> Self {
        Self {
            key,
            config,
            open_loader,
            jobs,
            state: Mutex::new(None),
            pool_exhaustions: AtomicU64::new(0),
            failed_submissions: AtomicU64::new(0),
        }
    }

    /// Streaming resource for a definition record, decoding with symphonia
    pub fn from_def(def: &ResourceDef, config: StreamingConfig, jobs: Arc<dyn JobSubmitter>) -> Self {
        let path = def.path.clone();
        let format = def.format;
        Self::new(
            ResourceKey::new(def.category, def.id),
            config,
            jobs,
            Box::new(move || open_loader(&path, format)),
        )
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Outstanding activations (0 when inactive)
    pub fn activations(&self) -> usize {
        self.state.lock().as_ref().map_or(0, |s| s.activations)
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Entries in the index map
    pub fn mapped_chunks(&self) -> usize {
        self.state.lock().as_ref().map_or(0, |s| s.mapping.len())
    }

    /// Slots currently Loading or Ready
    pub fn resident_chunks(&self) -> usize {
        self.state
            .lock()
            .as_ref()
            .map_or(0, |s| s.arena.resident_count())
    }

    /// State of a mapped logical chunk
    pub fn chunk_state(&self, index: usize) -> Option<ChunkState> {
        let guard = self.state.lock();
        let stream = guard.as_ref()?;
        stream.mapping.get(&index).map(|&slot| stream.state_of(slot))
    }

    /// Map `slot` to `index` and hand its decode to the job executor
    fn schedule(&self, stream: &mut StreamState, index: usize, slot: usize, priority: JobPriority) {
        stream.mapping.insert(index, slot);
        stream.arena.slot(slot).set_state(ChunkState::Loading);

        let arena = Arc::clone(&stream.arena);
        let loader = Arc::clone(&stream.loader);
        let key = self.key;
        let frame_offset = (index * self.config.chunk_size / 2) as u64;

        let job = Box::new(move || {
            load_into_slot(&arena, slot, loader.as_ref(), frame_offset, key, index);
        });

        if self.jobs.submit(priority, job).is_err() {
            // Leaves an end marker; the sound ends early at this chunk.
            // Reported on release: this runs on the audio thread.
            self.failed_submissions.fetch_add(1, Ordering::Relaxed);
            stream.arena.slot(slot).set_state(ChunkState::Unused);
        }
    }

    /// Schedule up to `count` chunks after `read_index`.
    ///
    /// Stops at an end marker or when no slot can be found.
    fn prefetch(&self, stream: &mut StreamState, read_index: usize, count: usize) {
        for index in read_index + 1..=read_index + count {
            if let Some(&slot) = stream.mapping.get(&index) {
                if stream.state_of(slot) == ChunkState::Unused {
                    break;
                }
                continue;
            }

            match stream.acquire_slot(self.config.preload_window, false) {
                Some(slot) => self.schedule(stream, index, slot, JobPriority::Prefetch),
                None => {
                    self.pool_exhaustions.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
        }
    }
}

/// Body of one chunk decode job
fn load_into_slot(
    arena: &ChunkArena,
    slot: usize,
    loader: &dyn Loader,
    frame_offset: u64,
    key: ResourceKey,
    index: usize,
) {
    let chunk = arena.slot(slot);

    if arena.is_retired() {
        chunk.set_state(ChunkState::Unused);
        return;
    }

    let result = {
        let mut buffer = chunk.lock_buffer();
        loader.load_chunk(&mut buffer, frame_offset)
    };

    match result {
        Ok(0) => {
            debug!("{} chunk {}: end of stream", key, index);
            chunk.set_state(ChunkState::Unused);
        }
        Ok(written) => {
            debug!("{} chunk {}: {} samples", key, index, written);
            chunk.set_state(ChunkState::Ready(written));
        }
        Err(e) => {
            warn!("Failed to decode chunk {} of {}: {}", index, key, e);
            chunk.set_state(ChunkState::Unused);
        }
    }
}

impl Resource for StreamingResource {
    fn key(&self) -> ResourceKey {
        self.key
    }

    fn activate(&self) -> Result<()> {
        {
            let mut guard = self.state.lock();
            if let Some(stream) = guard.as_mut() {
                stream.activations += 1;
                return Ok(());
            }
        }

        // Open outside the lock; probing a file must not stall the mixer
        let loader = (self.open_loader)()
            .map_err(|e| Error::Decode(format!("Cannot activate {}: {}", self.key, e)))?;

        let mut guard = self.state.lock();
        match guard.as_mut() {
            Some(stream) => stream.activations += 1,
            None => {
                *guard = Some(StreamState::new(&self.config, loader));
                debug!(
                    "Activated {} ({} chunks of {} samples)",
                    self.key, self.config.max_chunks, self.config.chunk_size
                );
            }
        }
        Ok(())
    }

    fn deactivate(&self) {
        let mut guard = self.state.lock();
        let Some(stream) = guard.as_mut() else {
            warn!("Deactivate on inactive resource {}", self.key);
            return;
        };

        stream.activations -= 1;
        if stream.activations == 0 {
            stream.arena.retire();
            *guard = None;
            debug!("Released chunk storage of {}", self.key);

            let failed = self.failed_submissions.swap(0, Ordering::Relaxed);
            if failed > 0 {
                warn!("{} chunk decodes of {} could not be scheduled", failed, self.key);
            }
        }
    }

    fn get_data(&self, position: usize, length: usize) -> ChunkRead {
        let mut guard = self.state.lock();
        let Some(stream) = guard.as_mut() else {
            return ChunkRead::EndOfStream;
        };

        let chunk_size = self.config.chunk_size;
        let index = position / chunk_size;
        let offset = position % chunk_size;
        stream.recent.record(index);

        let Some(&slot) = stream.mapping.get(&index) else {
            return match stream.acquire_slot(self.config.preload_window, true) {
                Some(slot) => {
                    self.schedule(stream, index, slot, JobPriority::Immediate);
                    self.prefetch(stream, index, self.config.preload_window.saturating_sub(1));
                    ChunkRead::Pending
                }
                None => {
                    self.pool_exhaustions.fetch_add(1, Ordering::Relaxed);
                    ChunkRead::Pending
                }
            };
        };

        match stream.state_of(slot) {
            ChunkState::Unused => {
                // End marker: consume it
                stream.mapping.remove(&index);
                stream.free.push_back(slot);
                ChunkRead::EndOfStream
            }
            ChunkState::Loading => ChunkRead::Pending,
            ChunkState::Ready(valid) => {
                // A short chunk is the last one; nothing to read ahead
                if valid == chunk_size {
                    self.prefetch(stream, index, self.config.preload_window);
                }

                if offset >= valid {
                    return ChunkRead::EndOfStream;
                }

                ChunkRead::Samples(SampleView::Chunk {
                    arena: Arc::clone(&stream.arena),
                    slot,
                    range: offset..offset + length.min(valid - offset),
                })
            }
        }
    }

    fn pool_exhaustions(&self) -> u64 {
        self.pool_exhaustions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use rtmix_common::Category;

    /// Collects jobs; tests run them explicitly
    #[derive(Default)]
    struct QueueJobs {
        jobs: PlMutex<Vec<(JobPriority, crate::playback::jobs::Job)>>,
    }

    impl JobSubmitter for QueueJobs {
        fn submit(&self, priority: JobPriority, job: crate::playback::jobs::Job) -> Result<()> {
            self.jobs.lock().push((priority, job));
            Ok(())
        }
    }

    struct RampLoader {
        frames: u64,
    }

    impl Loader for RampLoader {
        fn load_chunk(&self, dest: &mut [i16], frame_offset: u64) -> Result<usize> {
            let frames = (dest.len() as u64 / 2).min(self.frames.saturating_sub(frame_offset));
            for i in 0..frames as usize {
                dest[2 * i] = (frame_offset as usize + i) as i16;
                dest[2 * i + 1] = (frame_offset as usize + i) as i16;
            }
            Ok(frames as usize * 2)
        }
    }

    fn resource(jobs: Arc<QueueJobs>, frames: u64) -> StreamingResource {
        let config = StreamingConfig {
            chunk_size: 8,
            max_chunks: 2,
            preload_window: 1,
        };
        StreamingResource::new(
            ResourceKey::new(Category::Music, 1),
            config,
            jobs,
            Box::new(move || -> Result<Arc<dyn Loader>> { Ok(Arc::new(RampLoader { frames })) }),
        )
    }

    fn run_all(jobs: &QueueJobs) {
        let pending: Vec<_> = jobs.jobs.lock().drain(..).collect();
        for (_, job) in pending {
            job();
        }
    }

    #[test]
    fn test_recent_reads_newest_first() {
        let mut recent = RecentReads::default();
        assert_eq!(recent.last(4).count(), 0);

        for index in 1..=20 {
            recent.record(index);
        }
        assert_eq!(recent.last(3).collect::<Vec<_>>(), vec![20, 19, 18]);
        assert_eq!(recent.last(100).count(), RECENT_READS);
        assert_eq!(recent.last(100).last(), Some(5));
    }

    #[test]
    fn test_refused_submission_ends_stream() {
        struct Refusing;

        impl JobSubmitter for Refusing {
            fn submit(&self, _priority: JobPriority, _job: crate::playback::jobs::Job) -> Result<()> {
                Err(Error::Executor("stopped".to_string()))
            }
        }

        let res = StreamingResource::new(
            ResourceKey::new(Category::Music, 3),
            StreamingConfig {
                chunk_size: 8,
                max_chunks: 2,
                preload_window: 2,
            },
            Arc::new(Refusing),
            Box::new(|| -> Result<Arc<dyn Loader>> { Ok(Arc::new(RampLoader { frames: 100 })) }),
        );
        res.activate().unwrap();

        assert!(matches!(res.get_data(0, 8), ChunkRead::Pending));
        assert_eq!(res.failed_submissions.load(Ordering::Relaxed), 2);
        assert!(matches!(res.get_data(0, 8), ChunkRead::EndOfStream));

        // Counter is reported and reset on release
        res.deactivate();
        assert_eq!(res.failed_submissions.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_inactive_resource_is_end_of_stream() {
        let jobs = Arc::new(QueueJobs::default());
        let res = resource(jobs.clone(), 100);
        assert!(matches!(res.get_data(0, 8), ChunkRead::EndOfStream));
        assert!(jobs.jobs.lock().is_empty());
    }

    #[test]
    fn test_miss_then_ready() {
        let jobs = Arc::new(QueueJobs::default());
        let res = resource(jobs.clone(), 100);
        res.activate().unwrap();

        assert!(matches!(res.get_data(0, 8), ChunkRead::Pending));
        assert_eq!(jobs.jobs.lock()[0].0, JobPriority::Immediate);
        run_all(&jobs);

        match res.get_data(2, 8) {
            ChunkRead::Samples(view) => {
                assert_eq!(view.with_samples(|s| s.to_vec()), Some(vec![1, 1, 2, 2, 3, 3]));
            }
            _ => panic!("Expected samples"),
        }
    }

    #[test]
    fn test_late_completion_after_teardown_is_dropped() {
        let jobs = Arc::new(QueueJobs::default());
        let res = resource(jobs.clone(), 100);
        res.activate().unwrap();
        assert!(matches!(res.get_data(0, 8), ChunkRead::Pending));

        res.deactivate();
        assert!(!res.is_active());

        // Job still holds the retired arena; running it must be harmless
        run_all(&jobs);
        assert!(matches!(res.get_data(0, 8), ChunkRead::EndOfStream));
    }

    #[test]
    fn test_failed_activation_leaves_resource_inactive() {
        let jobs = Arc::new(QueueJobs::default());
        let res = StreamingResource::new(
            ResourceKey::new(Category::Game, 2),
            StreamingConfig::default(),
            jobs,
            Box::new(|| -> Result<Arc<dyn Loader>> { Err(Error::Decode("missing".to_string())) }),
        );

        assert!(matches!(res.activate(), Err(Error::Decode(_))));
        assert_eq!(res.activations(), 0);
    }
}
