//! # fanout
//!
//! Bounded fan-out job processing and deadline races on tokio.
//!
//! [`dispatch::Dispatcher`] spreads integer jobs over a fixed pool of worker
//! tasks and collects their results with a clean shutdown.
//! [`race::run_race`] races a timer against a cancellation deadline.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod race;
pub mod telemetry;
