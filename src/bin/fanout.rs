//! fanout CLI: drives the dispatcher and the deadline race.

use clap::{Args, Parser, Subcommand};
use fanout::config::Config;
use fanout::dispatch::{DispatchConfig, Dispatcher};
use fanout::model::{Drained, Job};
use fanout::race::{RaceConfig, RaceOutcome};
use fanout::telemetry::{TelemetryConfig, init_telemetry};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fanout", about = "Fan-out job dispatcher and deadline race")]
struct Cli {
    /// TOML config file (environment variables and flags override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print a JSON report instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a batch of jobs through the worker pool
    Dispatch {
        /// Job values (default: 1 2 3 4 5)
        #[arg(allow_negative_numbers = true, conflicts_with = "count")]
        jobs: Vec<i64>,
        /// Submit jobs 1..=N instead of listing them
        #[arg(long)]
        count: Option<i64>,
        #[command(flatten)]
        pool: PoolArgs,
    },
    /// Race a timer against a deadline
    Race {
        #[command(flatten)]
        race: RaceArgs,
        /// Run the race this many times
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Run the canonical dispatch batch, then the race
    Demo {
        #[command(flatten)]
        pool: PoolArgs,
        #[command(flatten)]
        race: RaceArgs,
    },
}

#[derive(Args)]
struct PoolArgs {
    /// Number of workers
    #[arg(long)]
    workers: Option<usize>,
    /// Input queue capacity
    #[arg(long)]
    input_capacity: Option<usize>,
    /// Output queue capacity
    #[arg(long)]
    output_capacity: Option<usize>,
    /// Simulated per-job delay in milliseconds
    #[arg(long)]
    job_delay_ms: Option<u64>,
}

impl PoolArgs {
    fn apply(&self, config: &mut DispatchConfig) {
        if let Some(n) = self.workers {
            config.workers = n;
        }
        if let Some(n) = self.input_capacity {
            config.input_capacity = n;
        }
        if let Some(n) = self.output_capacity {
            config.output_capacity = n;
        }
        if let Some(ms) = self.job_delay_ms {
            config.job_delay = Duration::from_millis(ms);
        }
    }
}

#[derive(Args)]
struct RaceArgs {
    /// Timer delay in milliseconds
    #[arg(long)]
    timer_ms: Option<u64>,
    /// Deadline in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,
}

impl RaceArgs {
    fn apply(&self, config: &mut RaceConfig) {
        if let Some(ms) = self.timer_ms {
            config.timer_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.deadline_ms {
            config.deadline = Duration::from_millis(ms);
        }
    }
}

#[derive(Serialize, Default)]
struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    dispatch: Option<DispatchReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    races: Vec<RaceOutcome>,
}

#[derive(Serialize)]
struct DispatchReport {
    workers: usize,
    jobs: Vec<Job>,
    sorted_values: Vec<i64>,
    #[serde(flatten)]
    drained: Drained,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_env()?;

    let _guard = init_telemetry(TelemetryConfig::from(&config))?;

    let mut report = Report::default();
    match cli.command {
        Command::Dispatch { jobs, count, pool } => {
            pool.apply(&mut config.dispatch);
            let jobs = match count {
                Some(n) => (1..=n).collect(),
                None if jobs.is_empty() => (1..=5).collect(),
                None => jobs,
            };
            report.dispatch = Some(cmd_dispatch(config.dispatch, jobs).await?);
        }
        Command::Race { race, repeat } => {
            race.apply(&mut config.race);
            for _ in 0..repeat {
                report.races.push(config.race.run().await);
            }
        }
        Command::Demo { pool, race } => {
            pool.apply(&mut config.dispatch);
            race.apply(&mut config.race);
            report.dispatch = Some(cmd_dispatch(config.dispatch, (1..=5).collect()).await?);
            report.races.push(config.race.run().await);
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

async fn cmd_dispatch(config: DispatchConfig, jobs: Vec<i64>) -> anyhow::Result<DispatchReport> {
    config.validate()?;
    let workers = config.workers;
    let jobs: Vec<Job> = jobs.into_iter().map(Job).collect();
    let drained = Dispatcher::run_batch(config, jobs.clone()).await?;
    Ok(DispatchReport {
        workers,
        jobs,
        sorted_values: drained.sorted_values(),
        drained,
    })
}

fn print_report(report: &Report) {
    if let Some(ref dispatch) = report.dispatch {
        println!(
            "Dispatched {} job(s) across {} worker(s)",
            dispatch.jobs.len(),
            dispatch.workers
        );
        for result in &dispatch.drained.results {
            println!(
                "  {:<10}  job {:>6}  ->  {}",
                result.worker.to_string(),
                result.job.to_string(),
                result.value
            );
        }
        println!("Results:   {:?}", dispatch.sorted_values);
        if dispatch.drained.failures.is_empty() {
            println!("Failures:  none");
        } else {
            for failure in &dispatch.drained.failures {
                println!(
                    "Failure:   {} job {}: {}",
                    failure.worker, failure.job, failure.error
                );
            }
        }
    }

    for outcome in &report.races {
        println!(
            "Race:      {} ({}ms)",
            outcome,
            outcome.elapsed().as_millis()
        );
    }
}
