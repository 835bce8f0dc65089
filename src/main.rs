// v2v-relay: a perception relay for multi-agent driving trials, with pluggable
// communication faults and a ground-truth collision monitor.

// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use v2v_relay::faults::FaultModelConfig;
use v2v_relay::prelude::*;
use v2v_relay::report::save_trial;
use v2v_relay::sweep::SweepSummary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::Args)]
struct TrialArgs {
    // Scenario JSON file; the built-in head-on scenario when absent
    #[arg(short, long)]
    scenario: Option<PathBuf>,
    // Trial configuration JSON file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    horizon: Option<f64>,
    #[arg(long)]
    tick_rate: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    force_green: bool,
    #[arg(short, long, default_value = "results")]
    output: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    // Runs a single trial
    Run {
        #[command(flatten)]
        trial: TrialArgs,
        #[arg(short, long, default_value = "identity")]
        fault: String,
        // Fault parameters, comma separated (four sigmas for noise)
        #[arg(short, long, value_delimiter = ',')]
        params: Vec<f64>,
    },

    // Runs the fault-free source trial and one follow-up per parameter
    Sweep {
        #[command(flatten)]
        trial: TrialArgs,
        #[arg(short, long, default_value = "radius")]
        fault: String,
        // Parameters to sweep; the family's standard list when absent
        #[arg(short, long, value_delimiter = ',')]
        params: Option<Vec<f64>>,
    },

    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let program_start = Instant::now();

    let cli = Cli::parse();

    let fallback = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Run { trial, fault, params } => {
            run_single_trial(trial, &fault, &params).await?;
        }

        Commands::Sweep { trial, fault, params } => {
            run_sweep(trial, &fault, params).await?;
        }

        Commands::List => {
            println!("\nAvailable Fault Models");

            for tag in FaultModelConfig::TAGS {
                match FaultModelConfig::default_sweep(tag) {
                    Some(values) => println!("  - {:<9} sweep: {:?}", tag, values),
                    None => println!("  - {}", tag),
                }
            }

            println!("\nUsage: cargo run -- run --fault <name> --params <values>");
            println!("Example: cargo run -- sweep --fault drop\n");
        }
    }

    let total_time = program_start.elapsed();
    info!("Total runtime: {}", format_time(total_time));

    Ok(())
}

fn load_inputs(args: &TrialArgs) -> Result<(ScenarioSpec, TrialConfig)> {
    let scenario = match &args.scenario {
        Some(path) => ScenarioSpec::from_file(path)?,
        None => ScenarioSpec::head_on(),
    };

    let mut config = match &args.config {
        Some(path) => TrialConfig::from_file(path)?,
        None => TrialConfig::default(),
    };
    config.name = scenario.name.clone();
    if let Some(horizon) = args.horizon {
        config.horizon_secs = horizon;
    }
    if let Some(rate) = args.tick_rate {
        config.tick_rate_hz = rate;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    config.force_green |= args.force_green;

    Ok((scenario, config))
}

fn results_dir(base: &Path, label: &str) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    base.join(format!("{}_{}", label, timestamp))
}

async fn run_single_trial(args: TrialArgs, fault: &str, params: &[f64]) -> Result<()> {
    let (scenario, config) = load_inputs(&args)?;
    let config = config.with_fault(FaultModelConfig::from_tag(fault, params)?);

    info!("V2V Relay: Single Trial");

    let trial = TrialCoordinator::new(config)?;
    let outcome = trial.run_scenario(&scenario).await?;

    distance_table(&outcome.min_distances);
    let dir = results_dir(&args.output, &format!("{}_{}", scenario.name, trial.config().fault.tag()));
    save_trial(&dir, &scenario, trial.config(), &outcome)?;

    Ok(())
}

async fn run_sweep(args: TrialArgs, fault: &str, params: Option<Vec<f64>>) -> Result<()> {
    let (scenario, config) = load_inputs(&args)?;
    let dir = results_dir(&args.output, &format!("{}_{}_sweep", scenario.name, fault));

    info!("V2V Relay: Sweep");

    let summary = Sweep::new(config, fault, params)?
        .with_output(dir.clone())
        .with_progress()
        .run(&scenario)
        .await?;

    sweep_table(&summary);
    let summary_path = dir.join("summary.json");
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
    info!("Sweep summary saved to: {}", summary_path.display());

    Ok(())
}

fn format_time(duration: Duration) -> String {
    let secs = duration.as_secs();
    let minutes = secs / 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}.{:03}", minutes, seconds, duration.subsec_millis())
}

fn distance_table(distances: &MinDistances) {
    println!("\n╔═══════════════════════╦══════════════╗");
    println!("║ Pair                  ║ Min dist (m) ║");
    println!("╠═══════════════════════╬══════════════╣");

    for (pair, d) in distances.iter() {
        let marker = if d == 0.0 { " !" } else { "  " };
        println!("║ {:<21} ║ {:>10.3}{} ║", pair.to_string(), d, marker);
    }

    println!("╚═══════════════════════╩══════════════╝\n");

    let collisions = distances.collisions();
    if collisions.is_empty() {
        println!("No collisions, closest approach {:.3} m", distances.overall());
    } else {
        println!("Collisions: {}", collisions.iter().map(|p| p.to_string()).collect::<Vec<_>>().join("; "));
    }
    println!();
}

fn sweep_table(summary: &SweepSummary) {
    println!("\n╔═══════════╦════════════╦════════════╦════════════╗");
    println!("║ Mode      ║ Param      ║ Dist (m)   ║ Diff (m)   ║");
    println!("╠═══════════╬════════════╬════════════╬════════════╣");

    for row in &summary.rows {
        println!("║ {:<9} ║ {:>10.2} ║ {:>10.3} ║ {:>10.2} ║", row.mode, row.param, row.dist, row.diff);
    }

    println!("╚═══════════╩════════════╩════════════╩════════════╝\n");
    println!("Max diff: {:.2}  Min diff: {:.2}\n", summary.max_diff, summary.min_diff);
}
