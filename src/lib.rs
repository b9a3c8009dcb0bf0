//! Kinetic Monte Carlo simulation of reaction networks.
//!
//! A reaction network and an initial state are loaded from SQLite, many
//! independent Gillespie trajectories run in parallel on a worker pool, and
//! each finished trajectory is written back transactionally as a sequence of
//! `(seed, step, reaction_id, time)` rows.

use thiserror::Error;

pub mod dispatcher;
pub mod lattice;
pub mod network;
pub mod sampler;
pub mod simulation;
pub mod solver;
pub mod sql;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("malformed input: {0}")]
    Schema(String),
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
    #[error("lattice error: {0}")]
    Lattice(String),
}

pub type Result<T> = std::result::Result<T, SimError>;

pub use dispatcher::{Dispatcher, HistoryQueue, RunConfig, SeedQueue};
pub use network::{RateFactors, Reaction, ReactionNetwork};
pub use sampler::Sampler;
pub use simulation::{HistoryElement, HistoryPacket, Simulation};
pub use solver::{Event, LinearSolver, Solver, TreeSolver, Update};
