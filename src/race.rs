//! Deadline race: a timer against a cancellation deadline.
//!
//! [`DeadlineContext`] is a cancellation scope that fires on its own after a
//! fixed deadline. [`run_race`] waits for whichever comes first, the timer
//! or the context, and reports exactly one [`RaceOutcome`]. The losing
//! timer task is aborted; a value it produces late has no receiver left.

use crate::telemetry::{metrics, spans};
use opentelemetry::KeyValue;
use serde::{Serialize, Serializer};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug};

/// Why a [`DeadlineContext`] was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The deadline elapsed.
    DeadlineExceeded,
    /// Cancelled explicitly, or through the parent token.
    Canceled,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::DeadlineExceeded => f.write_str("context deadline exceeded"),
            CancelReason::Canceled => f.write_str("context canceled"),
        }
    }
}

/// A cancellation scope with a deadline.
///
/// Derived from a parent token: cancelling the parent cancels this context
/// too. The first reason recorded wins. Dropping the context cancels it and
/// stops its deadline clock.
#[derive(Debug)]
pub struct DeadlineContext {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
    deadline: Duration,
    clock: JoinHandle<()>,
}

impl DeadlineContext {
    /// Create a context that cancels itself `deadline` from now.
    ///
    /// Must be called within a tokio runtime.
    pub fn with_timeout(parent: &CancellationToken, deadline: Duration) -> Self {
        let token = parent.child_token();
        let reason = Arc::new(OnceLock::new());

        let clock = tokio::spawn({
            let token = token.clone();
            let reason = Arc::clone(&reason);
            async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        let _ = reason.set(CancelReason::DeadlineExceeded);
                        token.cancel();
                    }
                }
            }
        });

        Self {
            token,
            reason,
            deadline,
            clock,
        }
    }

    /// The deadline this context was created with.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Token for work bound to this context.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel now with [`CancelReason::Canceled`], unless already cancelled.
    pub fn cancel(&self) {
        let _ = self.reason.set(CancelReason::Canceled);
        self.token.cancel();
    }

    /// Wait until the context is cancelled.
    pub async fn done(&self) {
        self.token.cancelled().await;
    }

    /// `None` while live, otherwise why it was cancelled. Stable once
    /// observed.
    pub fn err(&self) -> Option<CancelReason> {
        if !self.token.is_cancelled() {
            return None;
        }
        // Parent cancellation leaves no reason behind.
        Some(*self.reason.get_or_init(|| CancelReason::Canceled))
    }
}

impl Drop for DeadlineContext {
    fn drop(&mut self) {
        self.token.cancel();
        self.clock.abort();
    }
}

/// How a race ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RaceOutcome {
    TimerFired {
        #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
        elapsed: Duration,
    },
    Cancelled {
        reason: CancelReason,
        #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
        elapsed: Duration,
    },
}

impl RaceOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RaceOutcome::Cancelled { .. })
    }

    /// Short label used for metrics and comparisons across runs.
    pub fn category(&self) -> &'static str {
        match self {
            RaceOutcome::TimerFired { .. } => "timer",
            RaceOutcome::Cancelled { .. } => "cancelled",
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            RaceOutcome::TimerFired { elapsed } | RaceOutcome::Cancelled { elapsed, .. } => {
                *elapsed
            }
        }
    }
}

impl std::fmt::Display for RaceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaceOutcome::TimerFired { .. } => f.write_str("timer fired first"),
            RaceOutcome::Cancelled {
                reason: reason @ CancelReason::DeadlineExceeded,
                ..
            } => write!(f, "deadline exceeded, reason = {reason}"),
            RaceOutcome::Cancelled { reason, .. } => write!(f, "cancelled, reason = {reason}"),
        }
    }
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Delays for a single race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceConfig {
    pub timer_delay: Duration,
    pub deadline: Duration,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            timer_delay: Duration::from_millis(200),
            deadline: Duration::from_millis(100),
        }
    }
}

impl RaceConfig {
    pub async fn run(&self) -> RaceOutcome {
        run_race(self.timer_delay, self.deadline).await
    }
}

/// Race a `timer_delay` timer against a fresh context with `deadline`.
pub async fn run_race(timer_delay: Duration, deadline: Duration) -> RaceOutcome {
    let root = CancellationToken::new();
    let ctx = DeadlineContext::with_timeout(&root, deadline);
    run_race_with(&ctx, timer_delay).await
}

/// Race a `timer_delay` timer against an existing context.
///
/// If both are ready at the same instant, cancellation wins.
pub async fn run_race_with(ctx: &DeadlineContext, timer_delay: Duration) -> RaceOutcome {
    let span = spans::start_race_span(timer_delay, ctx.deadline());
    let start = Instant::now();

    let (tx, rx) = oneshot::channel();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(timer_delay).await;
        // No receiver means the race is already decided.
        let _ = tx.send(());
    });

    let outcome = async {
        tokio::select! {
            biased;
            _ = ctx.done() => RaceOutcome::Cancelled {
                reason: ctx.err().unwrap_or(CancelReason::Canceled),
                elapsed: start.elapsed(),
            },
            Ok(()) = rx => RaceOutcome::TimerFired { elapsed: start.elapsed() },
        }
    }
    .instrument(span.clone())
    .await;

    if !timer.is_finished() {
        span.in_scope(|| debug!("aborting timer task"));
    }
    timer.abort();

    metrics::race_outcomes().add(1, &[KeyValue::new("outcome", outcome.category())]);
    spans::record_race_outcome(&span, &outcome.to_string());
    outcome
}
