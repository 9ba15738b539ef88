//! Command-line runner for the blend scheduler.
//!
//! Builds a random part chain, lays its tasks out on the timeline, runs the
//! stepped execution and prints a summary of the recording.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use blend_core::config::Config;
use blend_core::scenario::Scenario;
use blend_core::scheduler::{RunOutcome, Scheduler, SchedulerObserver};
use blend_core::structure::Structure;
use clap::Parser;
use glam::Vec3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "blend-run")]
#[command(about = "Schedule and run a blend over a generated part chain")]
struct Cli {
    /// Number of parts in the generated chain
    #[arg(long, default_value = "6")]
    count: usize,

    /// Seed for the scenario generator
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Bound on each coordinate of a random morph offset
    #[arg(long, default_value = "1.5")]
    spread: f32,

    /// JSON file with run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Normalized time advanced per step, overrides the config file
    #[arg(long)]
    time_step: Option<f64>,

    /// Start every task at time zero instead of laying them out
    #[arg(long)]
    start_all_same_time: bool,

    /// Stop after this many recorded steps, at least 1
    #[arg(long)]
    max_steps: Option<NonZeroUsize>,
}

#[derive(Debug, Error)]
enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Logs progress at every tenth percent and stops after `max_steps`.
struct LogObserver {
    max_steps: Option<NonZeroUsize>,
    cancel: blend_core::scheduler::CancelHandle,
    last_logged: Option<u8>,
}

impl SchedulerObserver for LogObserver {
    fn on_started(&mut self) {
        info!("run started");
    }

    fn on_step(&mut self, index: usize, _snapshot: &Structure) {
        if let Some(max) = self.max_steps
            && index + 1 >= max.get()
        {
            self.cancel.cancel();
        }
    }

    fn on_progress(&mut self, percent: u8) {
        let decile = percent / 10;
        if self.last_logged != Some(decile) {
            self.last_logged = Some(decile);
            info!(percent, "progress");
        }
    }

    fn on_done(&mut self) {
        info!("run finished");
    }
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        }
        None => Config::default(),
    };
    if let Some(dt) = cli.time_step {
        cfg.time_step = dt;
    }
    Ok(cfg)
}

fn bounds(structure: &Structure) -> Option<(Vec3, Vec3)> {
    structure
        .parts
        .values()
        .flat_map(|p| p.control_points().iter().copied())
        .fold(None, |acc, p| match acc {
            None => Some((p, p)),
            Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
        })
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blend_run=info,blend_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        config = %serde_json::to_string(&cfg).unwrap_or_default(),
        "configuration loaded"
    );

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let scenario = Scenario::random_chain(cli.count, cli.spread, &mut rng);

    let mut scheduler = match Scheduler::new(scenario.structure, scenario.tasks, cfg) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot create scheduler: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.start_all_same_time {
        scheduler.start_all_same_time();
    } else if let Err(e) = scheduler.schedule() {
        error!("cannot lay out tasks: {e}");
        return ExitCode::FAILURE;
    }

    println!("total time: {:.2}", scheduler.total_execution_time());
    for i in scheduler.tasks_sorted_by_start() {
        let t = &scheduler.tasks()[i];
        println!(
            "  {:<12} {:<7} start {:>7.2} end {:>7.2}{}",
            t.part,
            format!("{:?}", t.kind).to_lowercase(),
            t.start,
            t.end_time(),
            if t.constraint { "  constraint" } else { "" }
        );
    }

    let mut observer = LogObserver {
        max_steps: cli.max_steps,
        cancel: scheduler.cancel_handle(),
        last_logged: None,
    };
    let outcome = scheduler.run(&mut observer);

    let (label, steps) = match outcome {
        RunOutcome::Completed { steps } => ("completed", steps),
        RunOutcome::Cancelled { steps } => ("cancelled", steps),
    };
    println!("run {label} with {steps} snapshots");

    if let Some(last) = scheduler.snapshots().last() {
        println!("final parts: {}", last.parts.len());
        if let Some((lo, hi)) = bounds(last) {
            println!("final bounds: {lo} .. {hi}");
        }
    }

    ExitCode::SUCCESS
}
