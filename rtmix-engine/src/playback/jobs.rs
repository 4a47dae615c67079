//! Background decode jobs
//!
//! Streaming resources hand chunk decodes to a [`JobSubmitter`] passed in at
//! construction. The production submitter is [`DecodeWorkerPool`]: a fixed set
//! of worker threads draining a priority queue.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Unit of background work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Job priority. Demand loads run before prefetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    /// A playing sound is waiting on this chunk
    Immediate,
    /// Read-ahead inside the preload window
    Prefetch,
}

/// Submission side of a job executor.
///
/// No completion ordering is guaranteed between submitted jobs.
pub trait JobSubmitter: Send + Sync {
    fn submit(&self, priority: JobPriority, job: Job) -> Result<()>;
}

/// Queued job with its FIFO sequence number
struct QueuedJob {
    priority: JobPriority,
    seq: u64,
    job: Job,
}

/// Max-heap ordering: Immediate first, then oldest first
impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

struct QueueState {
    heap: BinaryHeap<QueuedJob>,
    next_seq: u64,
}

/// Shared state for the worker pool
struct SharedPoolState {
    /// Priority queue of pending jobs
    queue: Mutex<QueueState>,

    /// Condition variable for notifying workers
    condvar: Condvar,

    /// Stop flag for shutdown
    stop_flag: AtomicBool,
}

/// Fixed-size decode worker pool
pub struct DecodeWorkerPool {
    state: Arc<SharedPoolState>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl DecodeWorkerPool {
    /// Start `workers` threads (at least one)
    pub fn new(workers: usize) -> Result<Self> {
        let state = Arc::new(SharedPoolState {
            queue: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
        });

        let workers = workers.max(1);
        let mut threads = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let state_clone = Arc::clone(&state);
            let handle = thread::Builder::new()
                .name(format!("rtmix-decode-{}", worker_id))
                .spawn(move || Self::worker_loop(worker_id, state_clone))?;
            threads.push(handle);
        }

        info!("Decode worker pool started with {} threads", workers);

        Ok(Self {
            state,
            threads: Mutex::new(threads),
        })
    }

    /// Worker thread main loop
    fn worker_loop(worker_id: usize, state: Arc<SharedPoolState>) {
        debug!("Worker {} started", worker_id);

        loop {
            let job = {
                let mut queue = state.queue.lock();

                // Wait for work or shutdown signal
                while queue.heap.is_empty() && !state.stop_flag.load(Ordering::Acquire) {
                    state.condvar.wait(&mut queue);
                }

                if state.stop_flag.load(Ordering::Acquire) {
                    debug!("Worker {} received shutdown signal", worker_id);
                    break;
                }

                queue.heap.pop()
            };

            if let Some(queued) = job {
                (queued.job)();
            }
        }

        debug!("Worker {} stopped", worker_id);
    }

    /// Stop the workers and join them. Queued jobs are dropped unrun.
    pub fn shutdown(&self) {
        if self.state.stop_flag.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down decode worker pool");

        let dropped = {
            let mut queue = self.state.queue.lock();
            let dropped = queue.heap.len();
            queue.heap.clear();
            dropped
        };
        if dropped > 0 {
            debug!("Dropped {} queued jobs", dropped);
        }

        self.state.condvar.notify_all();

        let threads = std::mem::take(&mut *self.threads.lock());
        for (idx, handle) in threads.into_iter().enumerate() {
            if let Err(e) = handle.join() {
                error!("Worker {} join failed: {:?}", idx, e);
            }
        }

        info!("Decode worker pool shut down");
    }

    /// Jobs waiting for a worker (diagnostics)
    pub fn queue_len(&self) -> usize {
        self.state.queue.lock().heap.len()
    }
}

impl JobSubmitter for DecodeWorkerPool {
    fn submit(&self, priority: JobPriority, job: Job) -> Result<()> {
        if self.state.stop_flag.load(Ordering::Acquire) {
            return Err(Error::Executor("Decode worker pool is shut down".to_string()));
        }

        {
            let mut queue = self.state.queue.lock();
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.heap.push(QueuedJob { priority, seq, job });
        }

        self.state.condvar.notify_one();
        Ok(())
    }
}

impl Drop for DecodeWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_on_workers() {
        let pool = DecodeWorkerPool::new(2).unwrap();
        let (tx, rx) = mpsc::channel();

        for i in 0..8 {
            let tx = tx.clone();
            pool.submit(
                JobPriority::Prefetch,
                Box::new(move || {
                    tx.send(i).unwrap();
                }),
            )
            .unwrap();
        }

        let mut seen: Vec<i32> = (0..8)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_immediate_runs_before_prefetch() {
        let pool = DecodeWorkerPool::new(1).unwrap();
        let (tx, rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();

        // Park the only worker so the queue builds up behind it
        pool.submit(
            JobPriority::Immediate,
            Box::new(move || {
                gate_rx.recv().unwrap();
            }),
        )
        .unwrap();

        // Wait until the worker has taken the gate job
        while pool.queue_len() > 0 {
            thread::sleep(Duration::from_millis(1));
        }

        for (name, priority) in [
            ("prefetch-1", JobPriority::Prefetch),
            ("immediate", JobPriority::Immediate),
            ("prefetch-2", JobPriority::Prefetch),
        ] {
            let tx = tx.clone();
            pool.submit(priority, Box::new(move || tx.send(name).unwrap()))
                .unwrap();
        }

        gate_tx.send(()).unwrap();

        let order: Vec<&str> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, vec!["immediate", "prefetch-1", "prefetch-2"]);
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pool = DecodeWorkerPool::new(1).unwrap();
        pool.shutdown();

        let result = pool.submit(JobPriority::Immediate, Box::new(|| {}));
        assert!(matches!(result, Err(Error::Executor(_))));
    }
}
