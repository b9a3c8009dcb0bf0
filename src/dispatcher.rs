//! Seed queue, worker pool, and the single-writer loop. Workers pop seeds,
//! run trajectories against the shared network, and push finished packets;
//! the dispatcher thread polls the history queue and owns the only write
//! connection, so the persistence layer never sees concurrent writers.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::network::ReactionNetwork;
use crate::simulation::{HistoryPacket, Simulation};
use crate::solver::Solver;
use crate::sql::{ReactionDatabase, StateDatabase};
use crate::{Result, SimError};

/// FIFO of trajectory seeds, drained by the workers.
pub struct SeedQueue {
    seeds: Mutex<VecDeque<u64>>,
}

impl SeedQueue {
    /// Seeds are the half-open range `[base_seed, base_seed + count)`.
    pub fn new(count: u64, base_seed: u64) -> Self {
        Self {
            seeds: Mutex::new((base_seed..base_seed + count).collect()),
        }
    }

    pub fn pop(&self) -> Option<u64> {
        self.seeds.lock().unwrap().pop_front()
    }
}

/// FIFO of finished trajectories. Packets move in and out; the lock is held
/// only for the queue operation itself.
pub struct HistoryQueue {
    packets: Mutex<VecDeque<HistoryPacket>>,
}

impl HistoryQueue {
    pub fn new() -> Self {
        Self {
            packets: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, packet: HistoryPacket) {
        self.packets.lock().unwrap().push_back(packet);
    }

    pub fn pop(&self) -> Option<HistoryPacket> {
        self.packets.lock().unwrap().pop_front()
    }
}

impl Default for HistoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RunConfig {
    pub number_of_simulations: u64,
    pub base_seed: u64,
    pub number_of_threads: usize,
    pub step_cutoff: u64,
    pub dependency_threshold: usize,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.number_of_simulations == 0 {
            return Err(SimError::Config(
                "number of simulations must be at least one".into(),
            ));
        }
        if self.number_of_threads == 0 {
            return Err(SimError::Config(
                "number of threads must be at least one".into(),
            ));
        }
        if self.step_cutoff == 0 {
            return Err(SimError::Config("step cutoff must be at least one".into()));
        }
        Ok(())
    }
}

/// Runs `number_of_simulations` trajectories over a worker pool and writes
/// them to the state database, one transaction per trajectory, in completion
/// order. Generic over the solver, so the sampling strategy is chosen once
/// at construction.
pub struct Dispatcher<S: Solver> {
    network: ReactionNetwork,
    state_database: StateDatabase,
    config: RunConfig,
    _solver: PhantomData<S>,
}

impl<S: Solver> Dispatcher<S> {
    pub fn new(
        reaction_database: ReactionDatabase,
        state_database: StateDatabase,
        config: RunConfig,
    ) -> Result<Self> {
        config.validate()?;
        let network = ReactionNetwork::from_databases(
            &reaction_database,
            &state_database,
            config.dependency_threshold,
        )?;
        state_database.ensure_trajectories_table()?;
        Ok(Self {
            network,
            state_database,
            config,
            _solver: PhantomData,
        })
    }

    /// Run every trajectory, join the workers, deduplicate, and hand back
    /// the state database for inspection.
    pub fn run(mut self) -> Result<StateDatabase> {
        let seed_queue = SeedQueue::new(self.config.number_of_simulations, self.config.base_seed);
        let history_queue = HistoryQueue::new();
        let aborted = AtomicU64::new(0);
        let network = &self.network;
        let step_cutoff = self.config.step_cutoff;

        let written = thread::scope(|scope| -> u64 {
            for _ in 0..self.config.number_of_threads {
                scope.spawn(|| {
                    run_worker::<S>(network, &seed_queue, &history_queue, step_cutoff, &aborted)
                });
            }

            let mut written = 0u64;
            while written + aborted.load(Ordering::Relaxed) < self.config.number_of_simulations {
                match history_queue.pop() {
                    Some(packet) => {
                        if let Err(err) = self.state_database.write_trajectory(&packet) {
                            // fatal: exit now rather than join in-flight workers
                            error!("trajectory write failed: {err}");
                            std::process::exit(1);
                        }
                        written += 1;
                    }
                    None => thread::sleep(Duration::from_millis(1)),
                }
            }
            written
        });

        let aborted = aborted.load(Ordering::Relaxed);
        if aborted > 0 {
            warn!(aborted, "trajectories aborted on inconsistent state");
        }
        let removed = self.state_database.deduplicate_trajectories()?;
        info!(written, removed, "removed duplicate trajectories");
        Ok(self.state_database)
    }
}

/// Worker loop: pop a seed, run the trajectory, push the history. An
/// inconsistent state aborts only the offending trajectory; it is reported
/// and counted so the dispatcher does not wait for its packet.
fn run_worker<S: Solver>(
    network: &ReactionNetwork,
    seed_queue: &SeedQueue,
    history_queue: &HistoryQueue,
    step_cutoff: u64,
    aborted: &AtomicU64,
) {
    while let Some(seed) = seed_queue.pop() {
        match Simulation::<S>::new(network, seed, step_cutoff).run() {
            Ok(packet) => history_queue.push(packet),
            Err(err) => {
                error!(seed, "trajectory aborted: {err}");
                aborted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
