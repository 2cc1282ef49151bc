//! Job handlers: what a worker does with each job it takes.

use crate::error::JobError;
use crate::model::Job;
use std::future::Future;
use std::time::Duration;

/// Turns a job into a result value.
///
/// An `Err` is reported on the dispatcher's failure channel; the worker
/// carries on with its next job.
pub trait JobHandler: Send + Sync + 'static {
    fn handle(&self, job: Job) -> impl Future<Output = Result<i64, JobError>> + Send;
}

/// The built-in handler: waits `delay`, then doubles the job.
///
/// The delay only makes worker interleaving observable.
#[derive(Debug, Clone, Copy)]
pub struct Doubler {
    pub delay: Duration,
}

impl Doubler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl JobHandler for Doubler {
    async fn handle(&self, job: Job) -> Result<i64, JobError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        job.0.checked_mul(2).ok_or(JobError::Overflow(job.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn doubler_doubles() {
        let d = Doubler::new(Duration::ZERO);
        assert_eq!(d.handle(Job(21)).await, Ok(42));
        assert_eq!(d.handle(Job(-4)).await, Ok(-8));
    }

    #[tokio::test]
    async fn doubler_reports_overflow() {
        let d = Doubler::new(Duration::ZERO);
        assert_eq!(d.handle(Job(i64::MAX)).await, Err(JobError::Overflow(i64::MAX)));
    }
}
