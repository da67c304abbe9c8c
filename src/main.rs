use clap::Parser;
use rail_sim::{load_scenario, LogSignalSink, SimulationConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

/// Runs a rail network scenario.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// The scenario descriptor (JSON).
    scenario: PathBuf,

    /// The number of steps to simulate.
    #[arg(long, default_value_t = 1000)]
    steps: usize,

    /// The time step in seconds.
    #[arg(long, default_value_t = 0.1)]
    dt: f64,

    /// Print the controller summary as JSON when done.
    #[arg(long)]
    summary: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let scenario = match load_scenario(&args.scenario) {
        Ok(scenario) => scenario,
        Err(err) => {
            eprintln!("Failed to load {}: {}", args.scenario.display(), err);
            return ExitCode::FAILURE;
        }
    };
    let mut sim = scenario.into_simulation(Box::new(LogSignalSink::new()), SimulationConfig::default());

    println!("Simulating {} units...", sim.active_units());
    let start = Instant::now();
    for _ in 0..args.steps {
        sim.step(args.dt);
    }
    let wall = start.elapsed();
    println!(
        "Simulated {:.1} s in {:?} --> {:.1}x real time (ends {})",
        sim.elapsed(),
        wall,
        sim.elapsed() / wall.as_secs_f64(),
        sim.sim_time()
    );

    if args.summary {
        match serde_json::to_string_pretty(&sim.controller_summary()) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                eprintln!("Failed to serialise summary: {}", err);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
