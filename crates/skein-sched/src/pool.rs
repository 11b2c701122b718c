//! Fixed-size pool of worker threads draining one [`TaskQueue`].
//!
//! Each worker loops `pop -> run -> pop` until it pops [`Job::Shutdown`].
//! Teardown pushes exactly one shutdown job per worker and joins them all,
//! so no per-worker state needs tracking. Teardown runs on [`Drop`] as well
//! as on [`WorkerPool::shutdown`], which makes it unconditional on every
//! exit path of the owner.
//!
//! A panicking task is caught, logged and counted; the worker that ran it
//! keeps draining the queue.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use tracing::{debug, error, info_span, trace};

use crate::error::{PoolError, PoolResult, SubmitError};
use crate::queue::{Job, Submitter, Task, TaskQueue};

/// Upper bound applied when the thread count is auto-detected
pub const MAX_DEFAULT_THREADS: usize = 8;

/// Thread count used when the caller does not pick one: the number of
/// logical CPUs, clamped to `1..=MAX_DEFAULT_THREADS`.
pub fn default_thread_count() -> usize {
    num_cpus::get().clamp(1, MAX_DEFAULT_THREADS)
}

/// Counters describing pool activity
///
/// All counters are atomic and can be read at any time without locking.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Tasks accepted by the pool or one of its submitters
    pub tasks_submitted: AtomicU64,
    /// Tasks that ran to completion or panicked
    pub tasks_completed: AtomicU64,
    /// Tasks that panicked
    pub tasks_panicked: AtomicU64,
}

impl PoolStats {
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`PoolStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_panicked: u64,
}

/// Fixed-size worker pool
pub struct WorkerPool {
    queue: TaskQueue,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Start `threads` workers, all blocked on an empty queue.
    pub fn new(threads: usize) -> PoolResult<Self> {
        Self::with_name(threads, "skein-worker")
    }

    /// Like [`WorkerPool::new`], naming threads `{prefix}-{index}`.
    pub fn with_name(threads: usize, prefix: &str) -> PoolResult<Self> {
        if threads == 0 {
            return Err(PoolError::NoThreads);
        }

        // Workers spawned so far are torn down by `Drop` if a later spawn fails.
        let mut pool = Self {
            queue: TaskQueue::new(),
            workers: Vec::with_capacity(threads),
            stats: Arc::new(PoolStats::default()),
        };

        for index in 0..threads {
            let queue = pool.queue.clone();
            let stats = Arc::clone(&pool.stats);

            let handle = std::thread::Builder::new()
                .name(format!("{prefix}-{index}"))
                .spawn(move || worker_main(queue, stats))
                .map_err(|source| PoolError::Spawn { index, source })?;

            pool.workers.push(handle);
        }

        debug!(threads, "worker pool started");
        Ok(pool)
    }

    /// Queue a closure on the pool.
    pub fn submit<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.stats.tasks_submitted.fetch_add(1, Ordering::Relaxed);
        self.queue.push_task(f);
    }

    /// A cloneable handle that lets running tasks feed the same queue.
    pub fn submitter(&self) -> Submitter {
        self.queue.submitter().counting(Arc::clone(&self.stats))
    }

    /// Submission callback in plain-function form.
    pub fn submit_fn(&self) -> impl Fn(Task) -> Result<(), SubmitError> + Send + Sync + use<> {
        let submitter = self.submitter();
        move |task| submitter.submit_boxed(task)
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Number of jobs waiting in the queue
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Stop every worker and wait for them to exit.
    ///
    /// Jobs queued before this call still run; workers exit as they reach
    /// the shutdown markers behind them.
    pub fn shutdown(mut self) {
        self.stop_workers();
    }

    fn stop_workers(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        for _ in &self.workers {
            self.queue.push(Job::Shutdown);
        }

        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("skein-worker").to_string();
            if worker.join().is_err() {
                error!(worker = %name, "worker thread exited abnormally");
            }
        }

        debug!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.workers.len())
            .field("pending", &self.queue.len())
            .finish()
    }
}

fn worker_main(queue: TaskQueue, stats: Arc<PoolStats>) {
    let thread_name = std::thread::current()
        .name()
        .unwrap_or("skein-worker")
        .to_string();

    let _span = info_span!("worker", name = %thread_name).entered();
    trace!("worker starting");

    loop {
        match queue.pop() {
            Job::Shutdown => break,
            Job::Run(task) => run_task(task, &stats),
        }
    }

    trace!("worker stopped");
}

fn run_task(task: Task, stats: &PoolStats) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
        let message = if let Some(s) = panic.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        error!(%message, "task panicked");
        stats.tasks_panicked.fetch_add(1, Ordering::Relaxed);
    }
    stats.tasks_completed.fetch_add(1, Ordering::Relaxed);
}
