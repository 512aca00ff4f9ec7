//! Concurrent job execution with strictly ordered commits.

pub mod gate;
mod worker;
pub mod worker_pool;

pub use gate::{CommitGate, CommitTurn};
pub use worker_pool::{JobSubmitter, WorkerPool, WorkerPoolParams};

use std::fmt;

/// Failures raised by the pool itself, as opposed to the fetch or commit
/// hooks it runs. Hook errors are wrapped with these as context so the
/// failing order stays visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A job asked for a commit turn that has already passed.
    OrderingViolation { order: u64, last_completed: u64 },
    JobFailed { worker: usize, order: u64 },
    CommitFailed { worker: usize, order: u64 },
    WorkerPanicked { worker: usize, message: String },
    /// Every worker exited before the last job was committed.
    WorkersExited,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::OrderingViolation {
                order,
                last_completed,
            } => write!(
                f,
                "job order {order} is not greater than last completed order {last_completed}"
            ),
            PoolError::JobFailed { worker, order } => {
                write!(f, "worker {worker} failed to execute job {order}")
            }
            PoolError::CommitFailed { worker, order } => {
                write!(f, "worker {worker} failed to commit job {order}")
            }
            PoolError::WorkerPanicked { worker, message } => {
                write!(f, "worker {worker} panicked: {message}")
            }
            PoolError::WorkersExited => write!(f, "all workers exited before the crawl finished"),
        }
    }
}

impl std::error::Error for PoolError {}
