//! Serial execution context backed by a single worker thread.
//!
//! A [`SerialContext`] drains a FIFO queue on one named OS thread, so jobs
//! submitted to it run asynchronously and strictly in submission order —
//! exactly the contract the dispatcher needs for progress ordering and
//! queue affinity.
//!
//! # Lifecycle
//!
//! The worker thread is spawned eagerly at construction. Shutdown is
//! graceful: pending jobs continue to execute, and [`shutdown_and_wait`]
//! bounds the wait with a timeout. Dropping the context shuts it down.
//!
//! A job that panics is caught and logged; the worker survives so the jobs
//! queued behind it still run in order.
//!
//! [`shutdown_and_wait`]: SerialContext::shutdown_and_wait

use super::{ExecutionContext, Job};
use crate::tracing_compat::error;
use crossbeam_queue::SegQueue;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle as ThreadJoinHandle};
use std::time::Duration;

/// Configuration options for a serial context.
#[derive(Debug, Clone)]
pub struct SerialContextOptions {
    /// Name for the worker thread and for diagnostics.
    pub name: String,
}

impl Default for SerialContextOptions {
    fn default() -> Self {
        Self {
            name: "vow-serial".to_string(),
        }
    }
}

struct SerialInner {
    /// Context name, also the worker thread name.
    name: String,
    /// Work queue, drained in FIFO order by the single worker.
    queue: SegQueue<Job>,
    /// Number of jobs not yet executed.
    pending_count: AtomicUsize,
    /// Shutdown flag.
    shutdown: AtomicBool,
    /// Set to false when the worker loop exits.
    worker_alive: AtomicBool,
    /// Condition variable for worker parking.
    condvar: Condvar,
    /// Mutex for the condition variable.
    mutex: Mutex<()>,
}

/// An execution context that runs jobs on one dedicated worker thread.
pub struct SerialContext {
    inner: Arc<SerialInner>,
    /// Worker join handle, taken by `shutdown_and_wait`.
    worker: Mutex<Option<ThreadJoinHandle<()>>>,
}

impl fmt::Debug for SerialContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialContext")
            .field("name", &self.inner.name)
            .field(
                "pending_jobs",
                &self.inner.pending_count.load(Ordering::Relaxed),
            )
            .field("shutdown", &self.inner.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl SerialContext {
    /// Creates a serial context with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(SerialContextOptions::default())
    }

    /// Creates a serial context whose worker thread carries the given name.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self::with_options(SerialContextOptions {
            name: name.to_string(),
        })
    }

    /// Creates a serial context with custom options.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to spawn the worker thread.
    #[must_use]
    pub fn with_options(options: SerialContextOptions) -> Self {
        let inner = Arc::new(SerialInner {
            name: options.name,
            queue: SegQueue::new(),
            pending_count: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            worker_alive: AtomicBool::new(true),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        });

        let worker_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(inner.name.clone())
            .spawn(move || {
                worker_loop(&worker_inner);
                worker_inner.worker_alive.store(false, Ordering::Release);
            })
            .expect("failed to spawn serial context worker");

        Self {
            inner,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Returns the number of jobs waiting to execute.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count.load(Ordering::Relaxed)
    }

    /// Returns `true` if the context has been shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Initiates shutdown.
    ///
    /// No new jobs are accepted. Jobs already queued continue to execute.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.notify();
    }

    /// Shuts down and waits for the worker to drain the queue and exit.
    ///
    /// Returns `true` if the worker exited within `timeout`, `false`
    /// otherwise.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();

        let deadline = std::time::Instant::now() + timeout;
        while self.inner.worker_alive.load(Ordering::Acquire) {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }

            // Wake the worker so it notices the shutdown flag
            self.notify();
            thread::sleep(Duration::from_millis(5).min(remaining));
        }

        // Worker has exited; join the handle to clean up
        if let Some(handle) = self
            .worker
            .lock()
            .expect("serial context worker lock poisoned")
            .take()
        {
            let _ = handle.join();
        }

        true
    }

    fn notify(&self) {
        let _guard = self
            .inner
            .mutex
            .lock()
            .expect("serial context lock poisoned");
        self.inner.condvar.notify_one();
    }
}

impl Default for SerialContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext for SerialContext {
    fn submit(&self, job: Job) {
        if self.is_shutdown() {
            error!(context = %self.inner.name, "job submitted after shutdown, dropping");
            return;
        }

        self.inner.queue.push(job);
        self.inner.pending_count.fetch_add(1, Ordering::Relaxed);
        self.notify();
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

impl Drop for SerialContext {
    fn drop(&mut self) {
        let _ = self.shutdown_and_wait(Duration::from_secs(5));
    }
}

/// The worker loop: drain jobs in FIFO order, park when idle.
fn worker_loop(inner: &SerialInner) {
    loop {
        if let Some(job) = inner.queue.pop() {
            inner.pending_count.fetch_sub(1, Ordering::Relaxed);

            // A panicking job must not take down the jobs queued behind it.
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!(context = %inner.name, "job panicked on serial context");
            }
            continue;
        }

        // Queue drained; honor shutdown
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        let guard = inner.mutex.lock().expect("serial context lock poisoned");
        // Re-check under the lock so a submit between pop and park is not missed
        if inner.queue.is_empty() && !inner.shutdown.load(Ordering::Acquire) {
            let _guard = inner
                .condvar
                .wait_timeout(guard, Duration::from_millis(50))
                .expect("serial context lock poisoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn runs_submitted_job() {
        let ctx = SerialContext::named("test-runs");
        let counter = Arc::new(AtomicI32::new(0));

        let c = Arc::clone(&counter);
        ctx.submit(Box::new(move || {
            c.fetch_add(1, Ordering::Relaxed);
        }));

        assert!(ctx.shutdown_and_wait(Duration::from_secs(2)));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn preserves_submission_order() {
        let ctx = SerialContext::named("test-order");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let s = Arc::clone(&seen);
            ctx.submit(Box::new(move || {
                s.lock().unwrap().push(i);
            }));
        }

        assert!(ctx.shutdown_and_wait(Duration::from_secs(2)));
        let recorded = seen.lock().unwrap().clone();
        assert_eq!(recorded, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn submit_is_asynchronous() {
        let ctx = SerialContext::named("test-async");
        let ran = Arc::new(AtomicBool::new(false));

        // Hold the worker hostage so the probe job cannot run inline
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let g = Arc::clone(&gate);
        ctx.submit(Box::new(move || {
            let (lock, cvar) = &*g;
            let mut open = lock.lock().unwrap();
            while !*open {
                open = cvar.wait(open).unwrap();
            }
        }));

        let r = Arc::clone(&ran);
        ctx.submit(Box::new(move || {
            r.store(true, Ordering::Release);
        }));

        // submit returned; the probe must not have run on this stack
        assert!(!ran.load(Ordering::Acquire));

        let (lock, cvar) = &*gate;
        *lock.lock().unwrap() = true;
        cvar.notify_one();

        assert!(ctx.shutdown_and_wait(Duration::from_secs(2)));
        assert!(ran.load(Ordering::Acquire));
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let ctx = SerialContext::named("test-panic");
        ctx.submit(Box::new(|| panic!("intentional panic")));

        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        ctx.submit(Box::new(move || {
            c.fetch_add(1, Ordering::Relaxed);
        }));

        assert!(ctx.shutdown_and_wait(Duration::from_secs(2)));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn shutdown_drains_pending_jobs() {
        let ctx = SerialContext::named("test-drain");
        let counter = Arc::new(AtomicI32::new(0));

        for _ in 0..50 {
            let c = Arc::clone(&counter);
            ctx.submit(Box::new(move || {
                c.fetch_add(1, Ordering::Relaxed);
            }));
        }

        assert!(ctx.shutdown_and_wait(Duration::from_secs(2)));
        assert_eq!(counter.load(Ordering::Relaxed), 50);
    }

    #[test]
    fn submit_after_shutdown_is_dropped() {
        let ctx = SerialContext::named("test-late");
        assert!(ctx.shutdown_and_wait(Duration::from_secs(2)));

        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        ctx.submit(Box::new(move || {
            c.fetch_add(1, Ordering::Relaxed);
        }));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn shutdown_idempotent() {
        let ctx = SerialContext::named("test-idem");
        ctx.shutdown();
        assert!(ctx.is_shutdown());
        ctx.shutdown();
        assert!(ctx.is_shutdown());
        assert!(ctx.shutdown_and_wait(Duration::from_secs(2)));
    }

    #[test]
    fn worker_thread_carries_name() {
        let ctx = SerialContext::named("vow-named");
        let seen = Arc::new(Mutex::new(String::new()));

        let s = Arc::clone(&seen);
        ctx.submit(Box::new(move || {
            if let Some(name) = thread::current().name() {
                *s.lock().unwrap() = name.to_string();
            }
        }));

        assert!(ctx.shutdown_and_wait(Duration::from_secs(2)));
        assert_eq!(*seen.lock().unwrap(), "vow-named");
    }
}
