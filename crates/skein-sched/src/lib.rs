//! # skein-sched
//!
//! A bounded pool of OS worker threads draining one shared FIFO of tasks.
//!
//! Tasks may submit further tasks to the same queue from inside a worker,
//! which lets a caller fan out work it only discovers while running. The
//! pool never needs to know how much work remains: shutdown is one
//! [`Job::Shutdown`] per worker, queued behind everything already pending.
//!
//! ```
//! use skein_sched::WorkerPool;
//! use std::sync::mpsc::channel;
//!
//! let pool = WorkerPool::new(2).unwrap();
//! let (tx, rx) = channel();
//! let submitter = pool.submitter();
//! pool.submit(move || {
//!     // discovered more work while running
//!     submitter.submit(move || tx.send(7).unwrap()).unwrap();
//! });
//! assert_eq!(rx.recv().unwrap(), 7);
//! pool.shutdown();
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod pool;
pub mod queue;

pub use error::{PoolError, PoolResult, SubmitError};
pub use pool::{MAX_DEFAULT_THREADS, PoolStats, PoolStatsSnapshot, WorkerPool, default_thread_count};
pub use queue::{Job, Submitter, Task, TaskQueue};
