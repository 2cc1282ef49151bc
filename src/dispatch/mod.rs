//! Fan-out job dispatcher.
//!
//! A fixed pool of worker tasks pulls integer jobs from a bounded input
//! queue and pushes results onto a bounded output queue. The driver closes
//! the input once every job is submitted; [`Dispatcher::drain`] waits for
//! every worker to exit before closing the output.

pub mod handler;
mod queue;
pub mod tracker;

pub use handler::{Doubler, JobHandler};
pub use queue::InputHandle;
pub use tracker::{CompletionTracker, WorkerGuard};

use crate::error::{Error, Result};
use crate::model::{Drained, Job, JobFailure, JobResult, WorkerId};
use crate::telemetry::{metrics, spans};
use queue::InputQueue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, Span, debug, info, warn};
use uuid::Uuid;

/// Configuration for a dispatcher run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Number of worker tasks. Must be at least 1.
    pub workers: usize,
    /// Bound of the input queue. Must be at least 1.
    pub input_capacity: usize,
    /// Bound of the output queue. Must be at least 1.
    pub output_capacity: usize,
    /// Simulated processing delay per job for the built-in handler.
    pub job_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            input_capacity: 100,
            output_capacity: 100,
            job_delay: Duration::from_millis(100),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("worker count must be at least 1".to_string()));
        }
        if self.input_capacity == 0 {
            return Err(Error::Config("input capacity must be at least 1".to_string()));
        }
        if self.output_capacity == 0 {
            return Err(Error::Config("output capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// A running worker pool with its input and output queues.
pub struct Dispatcher {
    run_id: Uuid,
    input: Arc<InputQueue>,
    output: mpsc::Receiver<JobResult>,
    failures: mpsc::UnboundedReceiver<JobFailure>,
    tracker: Arc<CompletionTracker>,
    workers: JoinSet<()>,
    worker_ids: HashMap<tokio::task::Id, WorkerId>,
    span: Span,
}

impl Dispatcher {
    /// Start a pool running the built-in [`Doubler`].
    pub fn start(config: DispatchConfig) -> Result<Self> {
        let handler = Doubler::new(config.job_delay);
        Self::start_with(config, handler)
    }

    /// Start a pool that runs `handler` on every job.
    ///
    /// Must be called within a tokio runtime.
    pub fn start_with<H: JobHandler>(config: DispatchConfig, handler: H) -> Result<Self> {
        config.validate()?;

        let run_id = Uuid::new_v4();
        let span = spans::start_dispatch_span(&run_id, config.workers);

        let input = Arc::new(InputQueue::new(config.input_capacity));
        let (output_tx, output_rx) = mpsc::channel(config.output_capacity);
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let tracker = Arc::new(CompletionTracker::new());
        let handler = Arc::new(handler);

        let mut workers = JoinSet::new();
        let mut worker_ids = HashMap::with_capacity(config.workers);

        for n in 1..=config.workers {
            let id = WorkerId(n);
            let worker = Worker {
                id,
                input: Arc::clone(&input),
                output: output_tx.clone(),
                failures: failure_tx.clone(),
                handler: Arc::clone(&handler),
                _guard: tracker.register(),
            };
            let abort = workers.spawn(worker.run().instrument(spans::start_worker_span(&span, id)));
            worker_ids.insert(abort.id(), id);
        }

        span.in_scope(|| {
            info!(
                workers = config.workers,
                input_capacity = config.input_capacity,
                output_capacity = config.output_capacity,
                "dispatcher started"
            );
        });

        Ok(Self {
            run_id,
            input,
            output: output_rx,
            failures: failure_rx,
            tracker,
            workers,
            worker_ids,
            span,
        })
    }

    /// Convenience driver: start a pool, feed `jobs` from a producer task,
    /// close the input and drain.
    pub async fn run_batch(
        config: DispatchConfig,
        jobs: impl IntoIterator<Item = Job>,
    ) -> Result<Drained> {
        let dispatcher = Self::start(config)?;
        let input = dispatcher.input();
        let jobs: Vec<Job> = jobs.into_iter().collect();

        let producer = tokio::spawn(async move {
            for job in jobs {
                if let Err(e) = input.submit(job).await {
                    let _ = input.close();
                    return Err(e);
                }
            }
            input.close()
        });

        let drained = dispatcher.drain().await?;
        producer
            .await
            .map_err(|e| Error::Other(format!("producer task failed: {e}")))??;
        Ok(drained)
    }

    /// Identifier of this run, as recorded on its spans.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// A producer handle sharing this dispatcher's input queue.
    pub fn input(&self) -> InputHandle {
        InputHandle::new(Arc::clone(&self.input))
    }

    /// Number of workers that have not exited yet.
    pub fn active_workers(&self) -> usize {
        self.tracker.active()
    }

    /// Enqueue one job, waiting while the input queue is full.
    ///
    /// Nothing reads results until [`Dispatcher::drain`] runs, so submitting
    /// more than `input_capacity + output_capacity + workers` jobs from the
    /// same task before draining never returns. Feed large batches from a
    /// separate producer task holding an [`InputHandle`], or use
    /// [`Dispatcher::run_batch`].
    ///
    /// # Errors
    ///
    /// [`Error::QueueClosed`] after [`Dispatcher::close_input`].
    pub async fn submit(&self, job: impl Into<Job>) -> Result<()> {
        self.input.submit(job.into()).await
    }

    /// Signal that no more jobs will be submitted. Workers exit once the
    /// queue is empty.
    ///
    /// # Errors
    ///
    /// [`Error::DoubleClose`] if the input was already closed.
    pub fn close_input(&self) -> Result<()> {
        self.input.close()?;
        self.span.in_scope(|| debug!("input closed"));
        Ok(())
    }

    /// Wait for every worker to exit, close the output queue and return
    /// everything collected.
    ///
    /// Results are consumed while waiting, so a small output capacity never
    /// stalls the workers. This does not close the input: call
    /// [`Dispatcher::close_input`] (or close through an [`InputHandle`])
    /// first, otherwise this waits for that close.
    ///
    /// # Errors
    ///
    /// [`Error::WorkerPanicked`] if a worker task panicked.
    pub async fn drain(mut self) -> Result<Drained> {
        let span = self.span.clone();
        async move {
            if !self.input.is_closed() {
                debug!("drain started before input closed, waiting for close");
            }

            let mut drained = Drained::default();
            loop {
                tokio::select! {
                    Some(result) = self.output.recv() => drained.results.push(result),
                    _ = self.tracker.wait_idle() => break,
                }
            }

            // No worker is left to write, so closing cannot lose a result.
            self.output.close();
            while let Ok(result) = self.output.try_recv() {
                drained.results.push(result);
            }
            while let Ok(failure) = self.failures.try_recv() {
                drained.failures.push(failure);
            }

            while let Some(joined) = self.workers.join_next().await {
                if let Err(e) = joined {
                    let worker = self.worker_ids.get(&e.id()).copied().unwrap_or(WorkerId(0));
                    let message = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        "task cancelled".to_string()
                    };
                    return Err(Error::WorkerPanicked { worker, message });
                }
            }

            info!(
                results = drained.results.len(),
                failures = drained.failures.len(),
                "dispatcher drained"
            );
            Ok(drained)
        }
        .instrument(span)
        .await
    }
}

/// One worker task's state. Dropping it counts the worker out.
struct Worker<H> {
    id: WorkerId,
    input: Arc<InputQueue>,
    output: mpsc::Sender<JobResult>,
    failures: mpsc::UnboundedSender<JobFailure>,
    handler: Arc<H>,
    _guard: WorkerGuard,
}

impl<H: JobHandler> Worker<H> {
    async fn run(self) {
        debug!("worker started");
        let mut processed = 0u64;

        while let Some(job) = self.input.take().await {
            let start = Instant::now();
            let outcome = self.handler.handle(job).await;
            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
            processed += 1;

            match outcome {
                Ok(value) => {
                    metrics::record_job_processed("ok", duration_ms);
                    debug!(job = %job, value, "job completed");
                    let result = JobResult {
                        job,
                        worker: self.id,
                        value,
                    };
                    if self.output.send(result).await.is_err() {
                        warn!(job = %job, "output queue closed, result discarded");
                        break;
                    }
                }
                Err(error) => {
                    metrics::record_job_processed("failed", duration_ms);
                    warn!(job = %job, %error, "job failed");
                    // Receiver lives as long as the dispatcher; a send error
                    // only means nobody is left to read it.
                    let _ = self.failures.send(JobFailure {
                        job,
                        worker: self.id,
                        error,
                    });
                }
            }
        }

        debug!(processed, "worker exiting");
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
