//! Deterministic job executor
//!
//! Queues submitted jobs in submission order. Nothing runs until the test
//! calls `run_next` or `run_all`, so chunk states can be inspected between
//! scheduling and completion.

use parking_lot::Mutex;
use rtmix_engine::playback::{Job, JobPriority, JobSubmitter};
use rtmix_engine::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<(JobPriority, Job)>>,
    shut_down: AtomicBool,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queued job count
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Priorities of queued jobs, oldest first
    pub fn priorities(&self) -> Vec<JobPriority> {
        self.queue.lock().iter().map(|(priority, _)| *priority).collect()
    }

    /// Run the oldest queued job. Returns false if the queue was empty.
    pub fn run_next(&self) -> bool {
        // Queue lock is released before the job runs
        let job = self.queue.lock().pop_front();
        match job {
            Some((_, job)) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run queued jobs until the queue is empty. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Make further submissions fail
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
    }
}

impl JobSubmitter for ManualExecutor {
    fn submit(&self, priority: JobPriority, job: Job) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::Executor("Manual executor is shut down".to_string()));
        }
        self.queue.lock().push_back((priority, job));
        Ok(())
    }
}
