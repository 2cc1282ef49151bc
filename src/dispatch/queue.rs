//! Input queue: bounded, FIFO, many producers and many consumers.
//!
//! Built on a bounded `tokio::sync::mpsc` channel. The single receiver is
//! shared between workers behind an async mutex, so taking a job and
//! observing closure happen under the same lock: no job is taken twice and
//! none is dropped when the queue closes.

use crate::error::{Error, Result};
use crate::model::Job;
use crate::telemetry::metrics;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug)]
pub(crate) struct InputQueue {
    /// `None` once closed.
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Job>>,
}

impl InputQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: tokio::sync::Mutex::new(rx),
        }
    }

    /// Enqueue one job, waiting while the queue is full.
    pub(crate) async fn submit(&self, job: Job) -> Result<()> {
        // Clone out of the lock so a blocked send never holds it. The clone
        // keeps the channel open until this send finishes, which orders the
        // send before closure as seen by workers.
        let tx = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::QueueClosed)?;
        tx.send(job).await.map_err(|_| Error::QueueClosed)?;
        metrics::jobs_submitted().add(1, &[]);
        tracing::trace!(job = %job, "job submitted");
        Ok(())
    }

    pub(crate) fn close(&self) -> Result<()> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(drop)
            .ok_or(Error::DoubleClose)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Take the next job, or `None` once the queue is closed and empty.
    pub(crate) async fn take(&self) -> Option<Job> {
        self.receiver.lock().await.recv().await
    }
}

/// Cloneable producer handle onto a dispatcher's input queue.
///
/// All handles share one queue: closing through any of them closes it for
/// every producer.
#[derive(Debug, Clone)]
pub struct InputHandle {
    queue: Arc<InputQueue>,
}

impl InputHandle {
    pub(crate) fn new(queue: Arc<InputQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue one job. Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// [`Error::QueueClosed`] if the queue was closed before the call.
    pub async fn submit(&self, job: impl Into<Job>) -> Result<()> {
        self.queue.submit(job.into()).await
    }

    /// Signal that no more jobs will be submitted.
    ///
    /// # Errors
    ///
    /// [`Error::DoubleClose`] if the queue is already closed.
    pub fn close(&self) -> Result<()> {
        self.queue.close()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn take_preserves_submission_order() {
        let queue = InputQueue::new(4);
        for n in [3, 1, 2] {
            queue.submit(Job(n)).await.unwrap();
        }
        queue.close().unwrap();

        let mut taken = Vec::new();
        while let Some(job) = queue.take().await {
            taken.push(job.0);
        }
        assert_eq!(taken, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn jobs_queued_before_close_are_still_delivered() {
        let queue = InputQueue::new(2);
        queue.submit(Job(7)).await.unwrap();
        queue.close().unwrap();

        assert_eq!(queue.take().await, Some(Job(7)));
        assert_eq!(queue.take().await, None);
    }
}
