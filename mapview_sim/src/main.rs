//! MapView Simulator CLI
//!
//! Run deterministic interaction scenarios against a simulated robot.

use clap::Parser;
use mapview_sim::scenarios::ScenarioId;
use mapview_sim::{write_png, ScenarioReport, ScenarioRunner, SimConfig, SimReport};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// MapView Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "mapview-sim")]
#[command(about = "Run deterministic interaction scenarios for MapView", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (click_inspect, pan_drag, pose_tracking, ..., all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Virtual seconds for the pose-tracking scenario
    #[arg(short, long)]
    duration: Option<f64>,

    /// JSON file with simulator and engine settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for PNG snapshots of each run's final view
    #[arg(long)]
    png_dir: Option<PathBuf>,

    /// Write the JSON report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // RUST_LOG wins over --verbose.
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !args.json {
        info!("MapView Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let mut config = match &args.config {
        Some(path) => SimConfig::load(path).unwrap_or_else(|e| {
            eprintln!("Error: {}: {}", path.display(), e);
            std::process::exit(2);
        }),
        None => SimConfig::default(),
    };
    if let Some(duration) = args.duration {
        config.duration_secs = duration;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
            eprintln!("Available scenarios: {}, all", names.join(", "));
            std::process::exit(2);
        })]
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    if let Some(dir) = &args.png_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error: cannot create {}: {}", dir.display(), e);
            std::process::exit(2);
        }
    }

    let mut report = SimReport::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed).with_config(config.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario).await;

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            let snapshot = match (&args.png_dir, &result.snapshot) {
                (Some(dir), Some(raster)) => {
                    let path = dir.join(format!("{}_{}.png", scenario.name(), seed));
                    match write_png(raster, &path) {
                        Ok(()) => Some(path),
                        Err(e) => {
                            warn!("Snapshot {} not written: {}", path.display(), e);
                            None
                        }
                    }
                }
                _ => None,
            };

            report.add(ScenarioReport::from_result(&result, snapshot));
        }
    }

    if let Some(path) = &args.report {
        match report.write_to_file(path) {
            Ok(()) => info!("Report written to {}", path.display()),
            Err(e) => error!("Failed to write report: {}", e),
        }
    }

    if args.json {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize report: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if report.failed == 0 {
            info!("✅ All {} scenario runs passed!", report.total);
        } else {
            error!("❌ {}/{} scenario runs failed!", report.failed, report.total);
            for result in report.results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario,
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if report.failed > 0 {
        std::process::exit(1);
    }
}
