//! Metric instrument factories for fanout.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a configured provider the instruments are no-ops.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("fanout")
}

/// Counter: jobs accepted by an input queue.
pub fn jobs_submitted() -> Counter<u64> {
    meter()
        .u64_counter("fanout.jobs.submitted")
        .with_description("Number of jobs accepted by the input queue")
        .build()
}

/// Counter: jobs taken and handled by a worker.
/// Labels: `outcome` ("ok" | "failed").
pub fn jobs_processed() -> Counter<u64> {
    meter()
        .u64_counter("fanout.jobs.processed")
        .with_description("Number of jobs handled by workers")
        .build()
}

/// Histogram: per-job handling time in milliseconds.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("fanout.job.duration_ms")
        .with_description("Job handling duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: deadline race results.
/// Labels: `outcome` ("timer" | "cancelled").
pub fn race_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("fanout.race.outcomes")
        .with_description("Deadline race results")
        .build()
}

pub(crate) fn record_job_processed(outcome: &'static str, duration_ms: f64) {
    let labels = [KeyValue::new("outcome", outcome)];
    jobs_processed().add(1, &labels);
    job_duration_ms().record(duration_ms, &labels);
}
