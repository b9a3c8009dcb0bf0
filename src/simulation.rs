use crate::network::ReactionNetwork;
use crate::solver::{Solver, Update};
use crate::Result;

/// One fired reaction and the absolute time after it fired.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistoryElement {
    pub reaction_id: usize,
    pub time: f64,
}

/// A finished trajectory. The history vector is allocated by the worker that
/// ran the simulation, moved through the history queue, and freed by the
/// dispatcher once the transaction commits; it is never copied on the way.
#[derive(Debug)]
pub struct HistoryPacket {
    pub history: Vec<HistoryElement>,
    pub seed: u64,
}

/// One trajectory: a private copy of the counts, a solver initialised with
/// the network's initial propensities, and the growing history.
pub struct Simulation<'a, S: Solver> {
    network: &'a ReactionNetwork,
    seed: u64,
    state: Vec<i64>,
    solver: S,
    history: Vec<HistoryElement>,
    updates: Vec<Update>,
    time: f64,
    step: u64,
    step_cutoff: u64,
}

impl<'a, S: Solver> Simulation<'a, S> {
    pub fn new(network: &'a ReactionNetwork, seed: u64, step_cutoff: u64) -> Self {
        Self {
            network,
            seed,
            state: network.initial_state().to_vec(),
            solver: S::new(seed, network.initial_propensities().to_vec()),
            history: Vec::with_capacity(step_cutoff as usize),
            updates: Vec::new(),
            time: 0.0,
            step: 0,
            step_cutoff,
        }
    }

    /// Run one Gillespie step. `Ok(false)` means every propensity is zero
    /// and the trajectory has terminated early.
    pub fn execute_step(&mut self) -> Result<bool> {
        let Some(event) = self.solver.event() else {
            return Ok(false);
        };
        self.time += event.dt;
        self.history.push(HistoryElement {
            reaction_id: event.index,
            time: self.time,
        });
        self.network
            .apply_and_collect_updates(&mut self.state, event.index, &mut self.updates)?;
        self.solver.update_many(&self.updates);
        self.step += 1;
        Ok(true)
    }

    /// Run to the step cutoff or to propensity exhaustion and hand the
    /// history off by move.
    pub fn run(mut self) -> Result<HistoryPacket> {
        while self.step < self.step_cutoff {
            if !self.execute_step()? {
                break;
            }
        }
        Ok(HistoryPacket {
            history: self.history,
            seed: self.seed,
        })
    }

    pub fn state(&self) -> &[i64] {
        &self.state
    }

    pub fn history(&self) -> &[HistoryElement] {
        &self.history
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }
}
