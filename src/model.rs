//! Core data model.
//!
//! A job is an integer handed to the dispatcher. Every job is taken by
//! exactly one worker and turns into either a result or a failure.

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// A unit of work: an integer task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Job(pub i64);

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Job {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Worker identity within a pool. Numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub usize);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Output of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job: Job,
    /// Which worker produced this result.
    pub worker: WorkerId,
    pub value: i64,
}

/// A job whose handler returned an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub job: Job,
    pub worker: WorkerId,
    #[serde(serialize_with = "display_error")]
    pub error: JobError,
}

fn display_error<S: serde::Serializer>(error: &JobError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// Everything collected by a drained dispatcher.
///
/// `results` is in completion order, which depends on worker interleaving
/// and must not be relied upon.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Drained {
    pub results: Vec<JobResult>,
    pub failures: Vec<JobFailure>,
}

impl Drained {
    /// Result values in completion order.
    pub fn values(&self) -> Vec<i64> {
        self.results.iter().map(|r| r.value).collect()
    }

    /// Result values sorted ascending, for order-insensitive comparison.
    pub fn sorted_values(&self) -> Vec<i64> {
        let mut values = self.values();
        values.sort_unstable();
        values
    }
}
