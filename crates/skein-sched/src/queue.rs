//! Unbounded FIFO of deferred work shared by every worker of a pool.
//!
//! The queue is a crossbeam MPMC channel. Producers may be any thread,
//! including the workers draining it, so a task is free to enqueue follow-up
//! work while it runs. Termination is signalled in-band with
//! [`Job::Shutdown`], one per worker.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::SubmitError;
use crate::pool::PoolStats;

/// A deferred unit of work, consumed exactly once by exactly one worker
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Message carried by the queue
pub enum Job {
    /// Run this task
    Run(Task),
    /// The worker that pops this stops looping
    Shutdown,
}

impl Job {
    /// Wrap a closure as a runnable job
    pub fn task<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::Run(Box::new(f))
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run(_) => f.write_str("Job::Run(..)"),
            Self::Shutdown => f.write_str("Job::Shutdown"),
        }
    }
}

/// FIFO task queue with blocking pop
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Append a job to the tail and wake one blocked popper.
    pub fn push(&self, job: Job) {
        // `self` holds a receiver, so the channel cannot be disconnected here.
        let _ = self.tx.send(job);
    }

    /// Append a closure as a runnable job.
    pub fn push_task<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Job::task(f));
    }

    /// Block until a job is available, then remove and return the head.
    pub fn pop(&self) -> Job {
        self.rx.recv().unwrap_or(Job::Shutdown)
    }

    /// Remove the head without blocking.
    pub fn try_pop(&self) -> Option<Job> {
        self.rx.try_recv().ok()
    }

    /// A producer-only handle that does not keep the queue alive.
    pub fn submitter(&self) -> Submitter {
        Submitter {
            tx: self.tx.clone(),
            stats: None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable, thread-safe submission handle for a [`TaskQueue`]
///
/// This is what a pool hands to code that discovers work while running:
/// it can be cloned into tasks and used from worker threads. Once every
/// consumer of the queue is gone, submissions fail with [`SubmitError`].
#[derive(Clone)]
pub struct Submitter {
    tx: Sender<Job>,
    stats: Option<Arc<PoolStats>>,
}

impl Submitter {
    /// Count accepted submissions in `stats`.
    pub(crate) fn counting(mut self, stats: Arc<PoolStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Queue a closure for execution on some worker.
    pub fn submit<F>(&self, f: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_boxed(Box::new(f))
    }

    /// Queue an already boxed task.
    pub fn submit_boxed(&self, task: Task) -> Result<(), SubmitError> {
        // Counted before the send so a worker never completes an uncounted task.
        if let Some(stats) = &self.stats {
            stats.tasks_submitted.fetch_add(1, Ordering::Relaxed);
        }
        self.tx.send(Job::Run(task)).map_err(|_| {
            if let Some(stats) = &self.stats {
                stats.tasks_submitted.fetch_sub(1, Ordering::Relaxed);
            }
            SubmitError
        })
    }
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("pending", &self.tx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    fn run(job: Job) {
        match job {
            Job::Run(task) => task(),
            Job::Shutdown => panic!("unexpected shutdown"),
        }
    }

    #[test]
    fn test_pop_is_fifo() {
        let queue = TaskQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = Arc::clone(&seen);
            queue.push_task(move || seen.lock().unwrap().push(i));
        }
        assert_eq!(queue.len(), 5);

        for _ in 0..5 {
            run(queue.pop());
        }

        assert!(queue.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shutdown_is_a_regular_entry() {
        let queue = TaskQueue::new();
        queue.push(Job::Shutdown);
        queue.push_task(|| {});

        assert!(queue.pop().is_shutdown());
        assert!(!queue.pop().is_shutdown());
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = TaskQueue::new();
        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.pop().is_shutdown())
        };

        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.push(Job::Shutdown);

        assert!(consumer.join().unwrap());
    }

    #[test]
    fn test_submitter_fails_once_queue_is_dropped() {
        let queue = TaskQueue::new();
        let submitter = queue.submitter();
        assert!(submitter.submit(|| {}).is_ok());

        drop(queue);
        assert!(submitter.submit(|| {}).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_every_task_delivered_once(
            producers in 1usize..5,
            consumers in 1usize..5,
            per_producer in 1usize..40,
        ) {
            let queue = TaskQueue::new();
            let seen = Arc::new(Mutex::new(Vec::new()));

            let consumer_handles: Vec<_> = (0..consumers)
                .map(|_| {
                    let queue = queue.clone();
                    std::thread::spawn(move || {
                        while let Job::Run(task) = queue.pop() {
                            task();
                        }
                    })
                })
                .collect();

            let producer_handles: Vec<_> = (0..producers)
                .map(|p| {
                    let submitter = queue.submitter();
                    let seen = Arc::clone(&seen);
                    std::thread::spawn(move || {
                        for i in 0..per_producer {
                            let seen = Arc::clone(&seen);
                            submitter
                                .submit(move || seen.lock().unwrap().push((p, i)))
                                .unwrap();
                        }
                    })
                })
                .collect();

            for handle in producer_handles {
                handle.join().unwrap();
            }
            for _ in 0..consumers {
                queue.push(Job::Shutdown);
            }
            for handle in consumer_handles {
                handle.join().unwrap();
            }

            let seen = seen.lock().unwrap();
            let unique: HashSet<_> = seen.iter().copied().collect();
            prop_assert_eq!(seen.len(), producers * per_producer);
            prop_assert_eq!(unique.len(), producers * per_producer);
        }
    }
}
