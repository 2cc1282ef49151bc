//! Error types for fanout.

use thiserror::Error;

use crate::model::WorkerId;

#[derive(Debug, Error)]
pub enum Error {
    /// Submit was attempted after the input queue was closed.
    #[error("input queue is closed")]
    QueueClosed,

    /// The input queue was closed a second time. Always a caller bug.
    #[error("input queue already closed")]
    DoubleClose,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker {worker} panicked: {message}")]
    WorkerPanicked { worker: WorkerId, message: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single job. Reported on the failure side channel, never
/// fatal to the worker that hit it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("result of job {0} overflows i64")]
    Overflow(i64),

    #[error("{0}")]
    Failed(String),
}
