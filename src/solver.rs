use tracing::debug;

use crate::sampler::Sampler;

/// A sampled reaction together with the waiting time before it fires.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub index: usize,
    pub dt: f64,
}

/// A recomputed propensity destined for the solver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Update {
    pub index: usize,
    pub propensity: f64,
}

/// Event sampling over a propensity vector.
///
/// Implementations own the vector, its running sum, the count of reactions
/// with nonzero propensity, and the trajectory's random stream. After any
/// sequence of updates the sum must equal the vector total within
/// floating-point tolerance, and `active_count` must equal the number of
/// strictly positive entries.
pub trait Solver {
    fn new(seed: u64, initial_propensities: Vec<f64>) -> Self;

    /// Sample the next reaction and waiting time, or `None` once every
    /// propensity is zero.
    fn event(&mut self) -> Option<Event>;

    fn update(&mut self, update: Update);

    fn update_many(&mut self, updates: &[Update]) {
        for &update in updates {
            self.update(update);
        }
    }

    fn propensity_sum(&self) -> f64;

    fn active_count(&self) -> usize;
}

/// Cumulative scan over `propensities`, returning the first index whose
/// running total exceeds `fraction`. `None` means the scan fell off the end,
/// which can only happen through accumulated floating-point error.
pub(crate) fn select_linear(propensities: &[f64], fraction: f64) -> Option<usize> {
    let mut partial = 0.0;
    for (index, &propensity) in propensities.iter().enumerate() {
        partial += propensity;
        if partial > fraction {
            return Some(index);
        }
    }
    None
}

/// O(R) linear-scan solver. Selection cost grows with the reaction count,
/// which is acceptable for small and medium networks.
pub struct LinearSolver {
    sampler: Sampler,
    propensities: Vec<f64>,
    propensity_sum: f64,
    active_count: usize,
    last_nonzero_index: usize,
}

impl Solver for LinearSolver {
    fn new(seed: u64, initial_propensities: Vec<f64>) -> Self {
        let mut solver = Self {
            sampler: Sampler::new(seed),
            propensities: initial_propensities,
            propensity_sum: 0.0,
            active_count: 0,
            last_nonzero_index: 0,
        };
        for (index, &propensity) in solver.propensities.iter().enumerate() {
            solver.propensity_sum += propensity;
            if propensity > 0.0 {
                solver.active_count += 1;
                solver.last_nonzero_index = index;
            }
        }
        solver
    }

    fn event(&mut self) -> Option<Event> {
        if self.active_count == 0 {
            self.propensity_sum = 0.0;
            return None;
        }

        let r1 = self.sampler.generate();
        let r2 = self.sampler.generate();
        let fraction = self.propensity_sum * r1;

        let index = select_linear(&self.propensities, fraction).unwrap_or_else(|| {
            debug!(
                fraction,
                propensity_sum = self.propensity_sum,
                "cumulative scan exhausted, falling back to last nonzero index"
            );
            self.last_nonzero_index
        });

        let dt = -r2.ln() / self.propensity_sum;
        Some(Event { index, dt })
    }

    fn update(&mut self, update: Update) {
        let old = self.propensities[update.index];
        if old > 0.0 {
            self.active_count -= 1;
        }
        if update.propensity > 0.0 {
            self.active_count += 1;
            if update.index > self.last_nonzero_index {
                self.last_nonzero_index = update.index;
            }
        }
        self.propensity_sum += update.propensity - old;
        self.propensities[update.index] = update.propensity;
    }

    fn propensity_sum(&self) -> f64 {
        self.propensity_sum
    }

    fn active_count(&self) -> usize {
        self.active_count
    }
}

/// Partial-sum binary tree solver: O(log R) update and selection. The root
/// holds the propensity sum; leaves past `len` stay zero.
pub struct TreeSolver {
    sampler: Sampler,
    len: usize,
    leaf_count: usize,
    data: Vec<f64>,
    active_count: usize,
    last_nonzero_index: usize,
}

impl TreeSolver {
    fn leaf(&self, index: usize) -> f64 {
        self.data[self.leaf_count + index]
    }

    fn select(&self, mut target: f64) -> usize {
        let mut node = 1usize;
        while node < self.leaf_count {
            let left = self.data[node << 1];
            if left > 0.0 && target < left {
                node <<= 1;
            } else {
                target -= left;
                node = (node << 1) | 1;
            }
        }
        node - self.leaf_count
    }
}

impl Solver for TreeSolver {
    fn new(seed: u64, initial_propensities: Vec<f64>) -> Self {
        let len = initial_propensities.len();
        let leaf_count = len.max(1).next_power_of_two();
        let mut data = vec![0.0; leaf_count * 2];
        let mut active_count = 0;
        let mut last_nonzero_index = 0;
        for (index, &propensity) in initial_propensities.iter().enumerate() {
            data[leaf_count + index] = propensity;
            if propensity > 0.0 {
                active_count += 1;
                last_nonzero_index = index;
            }
        }
        for node in (1..leaf_count).rev() {
            data[node] = data[node << 1] + data[node << 1 | 1];
        }
        Self {
            sampler: Sampler::new(seed),
            len,
            leaf_count,
            data,
            active_count,
            last_nonzero_index,
        }
    }

    fn event(&mut self) -> Option<Event> {
        if self.active_count == 0 {
            self.data[1] = 0.0;
            return None;
        }

        let r1 = self.sampler.generate();
        let r2 = self.sampler.generate();
        let propensity_sum = self.data[1];
        let fraction = propensity_sum * r1;

        let mut index = self.select(fraction);
        if index >= self.len || self.leaf(index) == 0.0 {
            // drift pushed the walk into a dead leaf
            debug!(
                fraction,
                propensity_sum, "tree selection landed on a zero leaf, falling back"
            );
            index = self.last_nonzero_index;
        }

        let dt = -r2.ln() / propensity_sum;
        Some(Event { index, dt })
    }

    fn update(&mut self, update: Update) {
        let mut position = self.leaf_count + update.index;
        let old = self.data[position];
        if old > 0.0 {
            self.active_count -= 1;
        }
        if update.propensity > 0.0 {
            self.active_count += 1;
            if update.index > self.last_nonzero_index {
                self.last_nonzero_index = update.index;
            }
        }
        self.data[position] = update.propensity;
        while position > 1 {
            position >>= 1;
            self.data[position] = self.data[position << 1] + self.data[position << 1 | 1];
        }
    }

    fn propensity_sum(&self) -> f64 {
        self.data[1]
    }

    fn active_count(&self) -> usize {
        self.active_count
    }
}
