//! Chunk arena for streaming resources
//!
//! An arena holds a fixed number of equally sized sample buffers (slots), each
//! with an atomic state word. Slots are addressed by index; nothing outside
//! the arena holds a reference into a buffer across threads.
//!
//! State transitions:
//! - `Unused -> Loading`: the resource mapped the slot and submitted a decode
//! - `Loading -> Ready(len)`: the decode produced `len` samples
//! - `Loading -> Unused`: the decode produced nothing (end of stream or error)
//! - `Ready -> Loading` / `Unused -> Loading`: the slot was reclaimed
//!
//! Workers publish with release ordering after releasing the buffer lock; the
//! mixer reads the state with acquire ordering before touching the buffer.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const TAG_UNUSED: u64 = 0;
const TAG_LOADING: u64 = 1;
const TAG_READY: u64 = 2;
const TAG_MASK: u64 = 0b11;

/// Lifecycle state of one chunk slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Free, or an end-of-stream marker while still mapped
    Unused,
    /// A background decode owns the buffer
    Loading,
    /// Holds this many valid samples
    Ready(usize),
}

impl ChunkState {
    fn encode(self) -> u64 {
        match self {
            ChunkState::Unused => TAG_UNUSED,
            ChunkState::Loading => TAG_LOADING,
            ChunkState::Ready(len) => ((len as u64) << 2) | TAG_READY,
        }
    }

    fn decode(word: u64) -> Self {
        match word & TAG_MASK {
            TAG_LOADING => ChunkState::Loading,
            TAG_READY => ChunkState::Ready((word >> 2) as usize),
            _ => ChunkState::Unused,
        }
    }

    /// Loading or Ready
    pub fn is_resident(self) -> bool {
        !matches!(self, ChunkState::Unused)
    }
}

/// One fixed-size sample buffer plus its state word
pub struct ChunkSlot {
    state: AtomicU64,
    buffer: Mutex<Vec<i16>>,
}

impl ChunkSlot {
    fn new(capacity: usize) -> Self {
        Self {
            state: AtomicU64::new(TAG_UNUSED),
            buffer: Mutex::new(vec![0; capacity]),
        }
    }

    pub fn state(&self) -> ChunkState {
        ChunkState::decode(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ChunkState) {
        self.state.store(state.encode(), Ordering::Release);
    }

    /// Exclusive access for a decode job
    pub(crate) fn lock_buffer(&self) -> MutexGuard<'_, Vec<i16>> {
        self.buffer.lock()
    }

    /// Non-blocking access for the mixer. `None` if a decode holds the buffer.
    pub(crate) fn try_read(&self) -> Option<MutexGuard<'_, Vec<i16>>> {
        self.buffer.try_lock()
    }
}

/// Storage for one activation of a streaming resource
pub struct ChunkArena {
    slots: Vec<ChunkSlot>,
    chunk_size: usize,
    retired: AtomicBool,
}

impl ChunkArena {
    /// Allocate `count` slots of `chunk_size` samples, all Unused
    pub fn new(count: usize, chunk_size: usize) -> Self {
        Self {
            slots: (0..count).map(|_| ChunkSlot::new(chunk_size)).collect(),
            chunk_size,
            retired: AtomicBool::new(false),
        }
    }

    pub fn slot(&self, index: usize) -> &ChunkSlot {
        &self.slots[index]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Mark the arena as released by its resource. Jobs starting afterwards skip their decode.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Slots currently Loading or Ready
    pub fn resident_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state().is_resident())
            .count()
    }
}
