//! Worker pool for blocking engine calls.
//!
//! A fixed set of named threads pulls jobs from one FIFO queue. The queue is
//! bounded: once `max_queue_depth` jobs are waiting, further submissions are
//! refused with [`Error::Busy`] instead of blocking the submitting thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use quarry_core::{Error, Result};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs waiting in the queue
    pub queue_depth: usize,
    /// Jobs currently running on a worker
    pub active_jobs: usize,
    /// Jobs finished since the pool started (panicked ones included)
    pub jobs_completed: u64,
    /// Number of worker threads
    pub worker_count: usize,
}

struct PoolInner {
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    idle: Condvar,
    shutdown: AtomicBool,
    active_jobs: AtomicUsize,
    jobs_completed: AtomicU64,
    max_queue_depth: usize,
}

/// Fixed-size FIFO worker pool.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Start `workers` threads named `quarry-worker-0`, `quarry-worker-1`, ...
    pub fn new(workers: usize, max_queue_depth: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::bad_argument("worker pool needs at least one thread"));
        }
        if max_queue_depth == 0 {
            return Err(Error::bad_argument("max_queue_depth must be positive"));
        }

        let pool = WorkerPool {
            inner: Arc::new(PoolInner {
                queue: Mutex::new(VecDeque::new()),
                work_ready: Condvar::new(),
                idle: Condvar::new(),
                shutdown: AtomicBool::new(false),
                active_jobs: AtomicUsize::new(0),
                jobs_completed: AtomicU64::new(0),
                max_queue_depth,
            }),
            workers: Mutex::new(Vec::with_capacity(workers)),
            worker_count: workers,
        };

        for i in 0..workers {
            let inner = Arc::clone(&pool.inner);
            let spawned = std::thread::Builder::new()
                .name(format!("quarry-worker-{}", i))
                .spawn(move || worker_loop(&inner));
            match spawned {
                Ok(handle) => pool.workers.lock().push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(Error::internal(format!(
                        "failed to spawn worker thread: {}",
                        e
                    )));
                }
            }
        }

        debug!(target: "quarry::dispatch", workers, max_queue_depth, "Worker pool started");
        Ok(pool)
    }

    /// Queue `job` for execution on a worker thread.
    ///
    /// Fails with [`Error::Busy`] when the queue is full or the pool has been
    /// shut down; the job is dropped without running.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(Error::Busy("worker pool is shut down".to_string()));
        }
        {
            let mut queue = self.inner.queue.lock();
            if queue.len() >= self.inner.max_queue_depth {
                return Err(Error::Busy(format!(
                    "worker queue is full ({} jobs waiting)",
                    queue.len()
                )));
            }
            queue.push_back(Box::new(job));
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until the queue is empty and no job is running.
    ///
    /// Workers stay up afterwards.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while !queue.is_empty() || self.inner.active_jobs.load(Ordering::Acquire) > 0 {
            self.inner.idle.wait(&mut queue);
        }
    }

    /// Stop accepting jobs, let workers finish the queue, and join them.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            // Notify under the lock so no worker misses the wakeup.
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        let current = std::thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }

    /// Current metrics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            queue_depth: self.inner.queue.lock().len(),
            active_jobs: self.inner.active_jobs.load(Ordering::Relaxed),
            jobs_completed: self.inner.jobs_completed.load(Ordering::Relaxed),
            worker_count: self.worker_count,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Keeps `active_jobs` honest when a job unwinds.
struct ActiveJob<'a> {
    inner: &'a PoolInner,
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        let was_active = self.inner.active_jobs.fetch_sub(1, Ordering::Release);
        self.inner.jobs_completed.fetch_add(1, Ordering::Relaxed);
        if was_active == 1 {
            let queue = self.inner.queue.lock();
            if queue.is_empty() {
                self.inner.idle.notify_all();
            }
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    inner.active_jobs.fetch_add(1, Ordering::Release);
                    break job;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _active = ActiveJob { inner };
        if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
            error!(
                target: "quarry::dispatch",
                panic = panic_message(&*panic),
                "Worker job panicked"
            );
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "(non-string panic)"
    }
}
