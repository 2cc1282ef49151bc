//! Integration tests for the deadline race.
//!
//! Runs on tokio's paused clock so timer ordering is deterministic.

use fanout::race::{CancelReason, DeadlineContext, RaceConfig, RaceOutcome, run_race, run_race_with};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test(start_paused = true)]
async fn deadline_before_timer_reports_cancellation() {
    let outcome = run_race(ms(200), ms(100)).await;

    assert_eq!(
        outcome,
        RaceOutcome::Cancelled {
            reason: CancelReason::DeadlineExceeded,
            elapsed: outcome.elapsed(),
        }
    );
    assert_eq!(
        outcome.to_string(),
        "deadline exceeded, reason = context deadline exceeded"
    );
    assert!(outcome.elapsed() >= ms(100));
    assert!(outcome.elapsed() < ms(200));
}

#[tokio::test(start_paused = true)]
async fn timer_before_deadline_reports_timer() {
    let outcome = run_race(ms(50), ms(200)).await;

    assert!(matches!(outcome, RaceOutcome::TimerFired { .. }));
    assert_eq!(outcome.to_string(), "timer fired first");
    assert!(outcome.elapsed() >= ms(50));
    assert!(outcome.elapsed() < ms(200));
}

#[tokio::test(start_paused = true)]
async fn repeated_runs_agree_on_outcome() {
    for (timer, deadline, expected) in [(200, 100, "cancelled"), (50, 200, "timer")] {
        for _ in 0..5 {
            let outcome = run_race(ms(timer), ms(deadline)).await;
            assert_eq!(outcome.category(), expected);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn race_config_defaults_to_cancellation() {
    let outcome = RaceConfig::default().run().await;
    assert!(outcome.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn explicit_cancel_wins_with_canceled_reason() {
    let root = CancellationToken::new();
    let ctx = DeadlineContext::with_timeout(&root, ms(1_000));

    let (outcome, ()) = tokio::join!(run_race_with(&ctx, ms(500)), async {
        tokio::time::sleep(ms(10)).await;
        ctx.cancel();
    });

    assert_eq!(
        outcome,
        RaceOutcome::Cancelled {
            reason: CancelReason::Canceled,
            elapsed: outcome.elapsed(),
        }
    );
    assert_eq!(outcome.to_string(), "cancelled, reason = context canceled");
}

#[tokio::test(start_paused = true)]
async fn parent_cancellation_propagates() {
    let root = CancellationToken::new();
    let ctx = DeadlineContext::with_timeout(&root, ms(1_000));
    assert_eq!(ctx.err(), None);

    root.cancel();
    ctx.done().await;
    assert_eq!(ctx.err(), Some(CancelReason::Canceled));
}

#[tokio::test(start_paused = true)]
async fn context_reports_deadline_exceeded_after_deadline() {
    let root = CancellationToken::new();
    let ctx = DeadlineContext::with_timeout(&root, ms(100));
    assert_eq!(ctx.err(), None);
    assert!(!ctx.token().is_cancelled());

    ctx.done().await;
    assert_eq!(ctx.err(), Some(CancelReason::DeadlineExceeded));

    // A later cancel does not overwrite the first reason.
    ctx.cancel();
    assert_eq!(ctx.err(), Some(CancelReason::DeadlineExceeded));
    assert!(!root.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn already_cancelled_context_wins_immediately() {
    let root = CancellationToken::new();
    let ctx = DeadlineContext::with_timeout(&root, ms(1_000));
    ctx.cancel();

    let outcome = run_race_with(&ctx, ms(0)).await;
    assert!(outcome.is_cancelled());
    assert_eq!(outcome.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn dropping_context_cancels_work_bound_to_it() {
    let root = CancellationToken::new();
    let ctx = DeadlineContext::with_timeout(&root, ms(1_000));
    let bound = ctx.token().clone();

    drop(ctx);
    assert!(bound.is_cancelled());
    assert!(!root.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn outcome_serializes_with_reason_and_millis() {
    let outcome = run_race(ms(200), ms(100)).await;
    let json = serde_json::to_value(outcome).unwrap();

    assert_eq!(json["outcome"], "cancelled");
    assert_eq!(json["reason"], "deadline_exceeded");
    assert!(json["elapsed_ms"].as_u64().unwrap() >= 100);
}

fn alive_tasks() -> usize {
    tokio::runtime::Handle::current().metrics().num_alive_tasks()
}

#[tokio::test(start_paused = true)]
async fn losing_timer_task_is_not_left_running() {
    let before = alive_tasks();

    let outcome = run_race(ms(200), ms(100)).await;
    assert!(outcome.is_cancelled());

    // Past the point where the timer would have fired.
    tokio::time::sleep(ms(300)).await;
    assert_eq!(alive_tasks(), before);
}

#[tokio::test(start_paused = true)]
async fn losing_deadline_clock_is_not_left_running() {
    let before = alive_tasks();

    let outcome = run_race(ms(50), ms(200)).await;
    assert!(matches!(outcome, RaceOutcome::TimerFired { .. }));

    tokio::time::sleep(ms(300)).await;
    assert_eq!(alive_tasks(), before);
}

#[tokio::test(start_paused = true)]
async fn late_timer_does_not_touch_a_decided_race() {
    let root = CancellationToken::new();
    let ctx = DeadlineContext::with_timeout(&root, ms(100));

    let outcome = run_race_with(&ctx, ms(200)).await;
    tokio::time::sleep(ms(300)).await;

    assert_eq!(ctx.err(), Some(CancelReason::DeadlineExceeded));
    assert!(outcome.is_cancelled());
}
