//! Manually driven execution context for deterministic tests.
//!
//! A [`ManualContext`] queues jobs without running them; a test drains the
//! queue explicitly with [`run_all`] or [`run_one`]. This makes delivery
//! interleavings reproducible without sleeps or real threads, the same role
//! the deterministic lab scheduler plays for a full runtime.
//!
//! [`run_all`]: ManualContext::run_all
//! [`run_one`]: ManualContext::run_one

use super::{ExecutionContext, Job};
use crossbeam_queue::SegQueue;
use std::fmt;

/// An execution context drained only by explicit calls.
pub struct ManualContext {
    queue: SegQueue<Job>,
    name: String,
}

impl fmt::Debug for ManualContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualContext")
            .field("name", &self.name)
            .field("pending_jobs", &self.queue.len())
            .finish()
    }
}

impl ManualContext {
    /// Creates a manual context named `"vow-manual"`.
    #[must_use]
    pub fn new() -> Self {
        Self::named("vow-manual")
    }

    /// Creates a manual context with the given diagnostic name.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            queue: SegQueue::new(),
            name: name.to_string(),
        }
    }

    /// Returns the number of queued jobs.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Runs the oldest queued job, if any. Returns whether a job ran.
    pub fn run_one(&self) -> bool {
        match self.queue.pop() {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Runs queued jobs in FIFO order until the queue is empty, including
    /// jobs enqueued by the jobs themselves. Returns the number of jobs run.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }
}

impl Default for ManualContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext for ManualContext {
    fn submit(&self, job: Job) {
        self.queue.push(job);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn jobs_wait_for_explicit_drain() {
        let ctx = ManualContext::new();
        let counter = Arc::new(AtomicI32::new(0));

        let c = Arc::clone(&counter);
        ctx.submit(Box::new(move || {
            c.fetch_add(1, Ordering::Relaxed);
        }));

        assert_eq!(counter.load(Ordering::Relaxed), 0);
        assert_eq!(ctx.run_all(), 1);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn run_all_is_fifo_and_follows_requeues() {
        let ctx = Arc::new(ManualContext::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let s1 = Arc::clone(&seen);
        let s2 = Arc::clone(&seen);
        let inner_ctx = Arc::clone(&ctx);
        ctx.submit(Box::new(move || {
            s1.lock().unwrap().push(1);
            let s3 = Arc::clone(&s1);
            inner_ctx.submit(Box::new(move || {
                s3.lock().unwrap().push(3);
            }));
        }));
        ctx.submit(Box::new(move || {
            s2.lock().unwrap().push(2);
        }));

        assert_eq!(ctx.run_all(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn run_one_on_empty_returns_false() {
        let ctx = ManualContext::new();
        assert!(!ctx.run_one());
    }
}
