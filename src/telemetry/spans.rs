//! Span helpers for dispatcher runs and deadline races.

use crate::model::WorkerId;
use std::time::Duration;
use tracing::Span;
use uuid::Uuid;

/// Start the root span of one dispatcher run.
pub fn start_dispatch_span(run_id: &Uuid, workers: usize) -> Span {
    tracing::info_span!(
        "dispatch.run",
        "dispatch.run_id" = %run_id,
        "dispatch.workers" = workers,
    )
}

/// Start a worker span as a child of its run span.
pub fn start_worker_span(run: &Span, worker: WorkerId) -> Span {
    tracing::debug_span!(parent: run, "dispatch.worker", "worker.id" = worker.0)
}

/// Start a span for a deadline race.
///
/// The `race.outcome` field is declared empty and is filled by
/// [`record_race_outcome`].
pub fn start_race_span(timer_delay: Duration, deadline: Duration) -> Span {
    tracing::info_span!(
        "race.run",
        "race.timer_delay_ms" = timer_delay.as_millis() as u64,
        "race.deadline_ms" = deadline.as_millis() as u64,
        "race.outcome" = tracing::field::Empty,
    )
}

/// Record how a race ended on its span and emit an `info` event there.
pub fn record_race_outcome(span: &Span, outcome: &str) {
    span.record("race.outcome", outcome);
    span.in_scope(|| {
        tracing::info!(outcome, "race finished");
    });
}
