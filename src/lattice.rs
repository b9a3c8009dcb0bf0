//! Lattice extension: per-site-pair propensities layered over the
//! homogeneous vector, plus the minimal site-occupancy interface the solver
//! needs. The full geometry and neighbour builder live outside this crate.

use indexmap::IndexMap;
use tracing::debug;

use crate::sampler::Sampler;
use crate::solver::{Event, Update};
use crate::{Result, SimError};

/// A lattice site: grid coordinates, real-space coordinates, the occupant
/// species (with its count), and the precomputed neighbour list.
#[derive(Clone, Debug)]
pub struct Site {
    pub i: i32,
    pub j: i32,
    pub k: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub species: Option<usize>,
    pub occupancy: i64,
    pub can_adsorb: bool,
    pub neighbors: Vec<usize>,
}

impl Site {
    pub fn empty(i: i32, j: i32, k: i32, x: f64, y: f64, z: f64, can_adsorb: bool) -> Self {
        Self {
            i,
            j,
            k,
            x,
            y,
            z,
            species: None,
            occupancy: 0,
            can_adsorb,
            neighbors: Vec::new(),
        }
    }
}

/// Site storage with adsorption and desorption. Per-site counts are bounded
/// by the occupant species' degrees of freedom.
pub struct Lattice {
    sites: Vec<Site>,
    degrees_of_freedom: Vec<i64>,
}

impl Lattice {
    pub fn new(sites: Vec<Site>, degrees_of_freedom: Vec<i64>) -> Self {
        Self {
            sites,
            degrees_of_freedom,
        }
    }

    pub fn number_of_sites(&self) -> usize {
        self.sites.len()
    }

    pub fn site(&self, site_id: usize) -> &Site {
        &self.sites[site_id]
    }

    pub fn neighbors(&self, site_id: usize) -> &[usize] {
        &self.sites[site_id].neighbors
    }

    /// Place one unit of `species` on the site. The site must allow
    /// adsorption, hold either nothing or the same species, and stay within
    /// the species' degrees-of-freedom bound.
    pub fn adsorb(&mut self, site_id: usize, species: usize) -> Result<()> {
        let bound = *self.degrees_of_freedom.get(species).ok_or_else(|| {
            SimError::Lattice(format!("adsorption of unknown species {species}"))
        })?;
        let site = &mut self.sites[site_id];
        if !site.can_adsorb {
            return Err(SimError::Lattice(format!(
                "site {site_id} does not allow adsorption"
            )));
        }
        match site.species {
            Some(occupant) if occupant != species => {
                return Err(SimError::Lattice(format!(
                    "site {site_id} already holds species {occupant}"
                )));
            }
            _ => {}
        }
        if site.occupancy >= bound {
            return Err(SimError::Lattice(format!(
                "site {site_id} is at the occupancy bound {bound} for species {species}"
            )));
        }
        site.species = Some(species);
        site.occupancy += 1;
        Ok(())
    }

    /// Remove one unit from the site, returning the species removed. The
    /// site empties once its occupancy reaches zero.
    pub fn desorb(&mut self, site_id: usize) -> Result<usize> {
        let site = &mut self.sites[site_id];
        let species = site.species.ok_or_else(|| {
            SimError::Lattice(format!("desorption from empty site {site_id}"))
        })?;
        site.occupancy -= 1;
        if site.occupancy == 0 {
            site.species = None;
        }
        Ok(species)
    }
}

/// Canonical unordered pair of site ids: `SitePair::new(a, b)` equals
/// `SitePair::new(b, a)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SitePair {
    pub site_one: usize,
    pub site_two: usize,
}

impl SitePair {
    pub fn new(a: usize, b: usize) -> Self {
        if a <= b {
            Self {
                site_one: a,
                site_two: b,
            }
        } else {
            Self {
                site_one: b,
                site_two: a,
            }
        }
    }
}

/// A recomputed propensity for a reaction between two sites.
#[derive(Clone, Copy, Debug)]
pub struct LatticeUpdate {
    pub index: usize,
    pub propensity: f64,
    pub site_one: usize,
    pub site_two: usize,
}

/// A sampled lattice reaction with the pair of sites it fires on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatticeEvent {
    pub site_one: usize,
    pub site_two: usize,
    pub index: usize,
    pub dt: f64,
}

/// Outcome of sampling across the homogeneous vector and the lattice table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MixedEvent {
    Gas(Event),
    Lattice(LatticeEvent),
}

/// Solver mixing a gas-phase propensity vector with a per-site-pair table.
/// The table iterates in insertion order, so a fixed insertion history gives
/// a reproducible scan for a given seed.
pub struct LatticeSolver {
    sampler: Sampler,
    propensities: Vec<f64>,
    gas_sum: f64,
    active_count: usize,
    last_nonzero_index: usize,
    lattice_propensities: IndexMap<SitePair, Vec<(f64, usize)>>,
    lattice_sum: f64,
}

impl LatticeSolver {
    pub fn new(seed: u64, initial_propensities: Vec<f64>) -> Self {
        let mut solver = Self {
            sampler: Sampler::new(seed),
            propensities: initial_propensities,
            gas_sum: 0.0,
            active_count: 0,
            last_nonzero_index: 0,
            lattice_propensities: IndexMap::new(),
            lattice_sum: 0.0,
        };
        for (index, &propensity) in solver.propensities.iter().enumerate() {
            solver.gas_sum += propensity;
            if propensity > 0.0 {
                solver.active_count += 1;
                solver.last_nonzero_index = index;
            }
        }
        solver
    }

    pub fn propensity_sum(&self) -> f64 {
        self.gas_sum + self.lattice_sum
    }

    pub fn lattice_sum(&self) -> f64 {
        self.lattice_sum
    }

    /// Pair keys in the order the scan visits them.
    pub fn pairs(&self) -> impl Iterator<Item = &SitePair> {
        self.lattice_propensities.keys()
    }

    pub fn update(&mut self, update: Update) {
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
        self.gas_sum += update.propensity - old;
        self.propensities[update.index] = update.propensity;
    }

    pub fn update_many(&mut self, updates: &[Update]) {
        for &update in updates {
            self.update(update);
        }
    }

    /// Append an entry under the canonical pair key.
    pub fn update_lattice(&mut self, update: LatticeUpdate) {
        self.lattice_sum += update.propensity;
        self.lattice_propensities
            .entry(SitePair::new(update.site_one, update.site_two))
            .or_insert_with(Vec::new)
            .push((update.propensity, update.index));
    }

    pub fn update_lattice_many(&mut self, updates: &[LatticeUpdate]) {
        for &update in updates {
            self.update_lattice(update);
        }
    }

    /// Drop every entry for a pair of sites, e.g. after an adsorption or
    /// desorption invalidated them.
    pub fn clear_pair(&mut self, a: usize, b: usize) {
        if let Some(entries) = self.lattice_propensities.shift_remove(&SitePair::new(a, b)) {
            for (propensity, _) in entries {
                self.lattice_sum -= propensity;
            }
        }
    }

    /// Sample across both propensity sets: the gas-phase vector first, then
    /// the lattice table in insertion order. The scan stops at the first
    /// entry whose running total exceeds the drawn fraction; only when both
    /// ranges are exhausted (floating-point drift) does the last nonzero
    /// gas index stand in.
    pub fn event_lattice(&mut self) -> Option<MixedEvent> {
        if self.active_count == 0 && self.lattice_sum <= 0.0 {
            self.gas_sum = 0.0;
            return None;
        }

        let r1 = self.sampler.generate();
        let r2 = self.sampler.generate();
        let total = self.gas_sum + self.lattice_sum;
        let fraction = total * r1;
        let dt = -r2.ln() / total;

        let mut partial = 0.0;
        for (index, &propensity) in self.propensities.iter().enumerate() {
            partial += propensity;
            if partial > fraction {
                return Some(MixedEvent::Gas(Event { index, dt }));
            }
        }

        for (pair, entries) in &self.lattice_propensities {
            for &(propensity, index) in entries {
                partial += propensity;
                if partial > fraction {
                    return Some(MixedEvent::Lattice(LatticeEvent {
                        site_one: pair.site_one,
                        site_two: pair.site_two,
                        index,
                        dt,
                    }));
                }
            }
        }

        debug!(
            fraction,
            total, "lattice scan exhausted, falling back to last nonzero gas index"
        );
        Some(MixedEvent::Gas(Event {
            index: self.last_nonzero_index,
            dt,
        }))
    }
}
