use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use rxnsim::dispatcher::{Dispatcher, RunConfig};
use rxnsim::solver::{LinearSolver, TreeSolver};
use rxnsim::sql::{ReactionDatabase, StateDatabase};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SolverChoice {
    /// Cumulative linear scan, O(R) per event.
    Linear,
    /// Partial-sum tree, O(log R) per event.
    Tree,
}

#[derive(Parser)]
#[command(name = "rxnsim")]
#[command(about = "Kinetic Monte Carlo simulation of reaction networks", long_about = None)]
struct Cli {
    /// Reaction network database (read-only)
    #[arg(long)]
    reaction_database: PathBuf,

    /// Initial state database; trajectories are written back here
    #[arg(long)]
    initial_state_database: PathBuf,

    /// Number of trajectories to run
    #[arg(long)]
    number_of_simulations: u64,

    /// First trajectory seed; seeds run through base_seed + N - 1
    #[arg(long, default_value_t = 0)]
    base_seed: u64,

    /// Worker thread count
    #[arg(long, default_value_t = 1)]
    number_of_threads: usize,

    /// Maximum events per trajectory
    #[arg(long)]
    step_cutoff: u64,

    /// Dependent-set size above which all propensities are recomputed
    #[arg(long, default_value_t = 64)]
    dependency_threshold: usize,

    /// Event sampling strategy
    #[arg(long, value_enum, default_value_t = SolverChoice::Linear)]
    solver: SolverChoice,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> rxnsim::Result<()> {
    let reaction_database = ReactionDatabase::open(&cli.reaction_database)?;
    let state_database = StateDatabase::open(&cli.initial_state_database)?;
    let config = RunConfig {
        number_of_simulations: cli.number_of_simulations,
        base_seed: cli.base_seed,
        number_of_threads: cli.number_of_threads,
        step_cutoff: cli.step_cutoff,
        dependency_threshold: cli.dependency_threshold,
    };

    match cli.solver {
        SolverChoice::Linear => {
            Dispatcher::<LinearSolver>::new(reaction_database, state_database, config)?.run()?;
        }
        SolverChoice::Tree => {
            Dispatcher::<TreeSolver>::new(reaction_database, state_database, config)?.run()?;
        }
    }
    Ok(())
}
