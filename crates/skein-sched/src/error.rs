//! Error types for skein-sched

use thiserror::Error;

/// Errors raised while building or tearing down a worker pool
#[derive(Debug, Error)]
pub enum PoolError {
    /// A pool needs at least one worker
    #[error("worker pool requires at least one thread")]
    NoThreads,

    /// The OS refused to start a worker thread
    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

/// A task could not be queued because every worker has already exited
#[derive(Debug, Error)]
#[error("task rejected: worker pool has shut down")]
pub struct SubmitError;

/// Result type using PoolError
pub type PoolResult<T> = Result<T, PoolError>;
