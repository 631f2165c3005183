//! Throughput benchmark: runs the universe at several founder counts and
//! reports actions per second, births and deaths.

use anyhow::Context;
use clap::Parser;
use lifegrid_core::{Coordinator, PlacementStrategy, RunReport, SimConfig};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Benchmark concurrent agent runs on a toroidal grid")]
struct Args {
    /// JSON file with a (partial) simulation config; missing fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Founder counts to benchmark, one run each.
    #[arg(long, value_delimiter = ',', default_values_t = vec![8, 32, 64])]
    populations: Vec<usize>,
    #[arg(long)]
    height: Option<usize>,
    #[arg(long)]
    width: Option<usize>,
    #[arg(long)]
    duration_ms: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Scatter founders randomly instead of along the shuffled diagonal.
    #[arg(long)]
    random_placement: bool,
    /// Write the report of the last run here as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn base_config(args: &Args) -> anyhow::Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(duration_ms) = args.duration_ms {
        config.run_duration_ms = duration_ms;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.random_placement {
        config.placement = PlacementStrategy::Random;
    }
    Ok(config)
}

fn print_row(population: usize, report: &RunReport, wall_secs: f64) {
    let actions: usize = report.agents.iter().map(|a| a.log.len()).sum();
    let run_secs = report
        .stopped
        .as_secs_f64()
        - report.started.as_secs_f64();
    println!(
        "{:>6} founders | {:>9} actions | {:>10.0} actions/s | {:>5} births | {:>5} starved | gen {:>3} | wall {:.2}s",
        population,
        actions,
        actions as f64 / run_secs.max(f64::EPSILON),
        report.births,
        report.deaths.starvation,
        report.max_generation(),
        wall_secs,
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let base = base_config(&args)?;
    info!(
        height = base.height,
        width = base.width,
        duration_ms = base.run_duration_ms,
        "benchmark starting"
    );

    let mut last = None;
    for &population in &args.populations {
        let config = SimConfig {
            initial_population: population,
            ..base.clone()
        };
        let start = Instant::now();
        let report = Coordinator::try_new(config)?.run()?;
        print_row(population, &report, start.elapsed().as_secs_f64());
        if !report.drained {
            tracing::warn!(population, "run did not drain before timeout");
        }
        last = Some(report);
    }

    if let (Some(path), Some(report)) = (&args.report, &last) {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }
    Ok(())
}
