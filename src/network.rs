use crate::solver::Update;
use crate::sql::{ReactionDatabase, StateDatabase};
use crate::{Result, SimError};

/// A homogeneous reaction: up to two reactants, up to two products, and a
/// base rate constant. Species are referenced by index.
#[derive(Clone, Debug, PartialEq)]
pub struct Reaction {
    pub reactants: Vec<usize>,
    pub products: Vec<usize>,
    pub rate: f64,
}

/// Rate modifiers applied on top of the combinatorial factor. The defaults
/// reproduce plain mass-action kinetics: `factor_duplicate = 1/2` turns
/// `count * (count - 1)` into the pair count for identical reactants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateFactors {
    pub factor_zero: f64,
    pub factor_two: f64,
    pub factor_duplicate: f64,
}

impl Default for RateFactors {
    fn default() -> Self {
        Self {
            factor_zero: 1.0,
            factor_two: 1.0,
            factor_duplicate: 0.5,
        }
    }
}

/// Reactions whose propensity can change when a given reaction fires.
#[derive(Clone, Debug, PartialEq)]
pub enum Dependents {
    Listed(Vec<usize>),
    /// The derived set exceeded the dependency threshold; every propensity
    /// is recomputed after a firing of this reaction.
    All,
}

/// The static half of a simulation: reactions, initial state, the dependency
/// graph, and the propensities at the initial state. Shared read-only across
/// worker threads; all mutable trajectory state lives in `Simulation`.
#[derive(Debug)]
pub struct ReactionNetwork {
    reactions: Vec<Reaction>,
    initial_state: Vec<i64>,
    degrees_of_freedom: Vec<i64>,
    fixed_species: Vec<bool>,
    factors: RateFactors,
    initial_propensities: Vec<f64>,
    dependency_graph: Vec<Dependents>,
}

impl ReactionNetwork {
    pub fn new(
        reactions: Vec<Reaction>,
        initial_state: Vec<i64>,
        degrees_of_freedom: Vec<i64>,
        factors: RateFactors,
        fixed_species: Vec<bool>,
        dependency_threshold: usize,
    ) -> Result<Self> {
        let number_of_species = initial_state.len();
        if degrees_of_freedom.len() != number_of_species
            || fixed_species.len() != number_of_species
        {
            return Err(SimError::Schema(
                "species table lengths do not match the number of species".into(),
            ));
        }
        for (index, reaction) in reactions.iter().enumerate() {
            if reaction.reactants.len() > 2 || reaction.products.len() > 2 {
                return Err(SimError::Schema(format!(
                    "reaction {index} has more than two reactants or products"
                )));
            }
            for &species in reaction.reactants.iter().chain(reaction.products.iter()) {
                if species >= number_of_species {
                    return Err(SimError::Schema(format!(
                        "reaction {index} references species {species} beyond the species count {number_of_species}"
                    )));
                }
            }
            if !reaction.rate.is_finite() || reaction.rate < 0.0 {
                return Err(SimError::Schema(format!(
                    "reaction {index} has a negative or non-finite rate"
                )));
            }
        }
        for (species, &count) in initial_state.iter().enumerate() {
            if count < 0 {
                return Err(SimError::Schema(format!(
                    "initial count for species {species} is negative"
                )));
            }
        }

        let dependency_graph =
            build_dependency_graph(&reactions, number_of_species, dependency_threshold);
        let mut network = Self {
            reactions,
            initial_state,
            degrees_of_freedom,
            fixed_species,
            factors,
            initial_propensities: Vec::new(),
            dependency_graph,
        };
        let initial_propensities = (0..network.reactions.len())
            .map(|index| network.compute_propensity(&network.initial_state, index))
            .collect();
        network.initial_propensities = initial_propensities;
        Ok(network)
    }

    /// Load the network from its two databases: metadata, species and
    /// reactions from the reaction database; initial counts and the optional
    /// factor and fixed-species tables from the state database.
    pub fn from_databases(
        reaction_database: &ReactionDatabase,
        state_database: &StateDatabase,
        dependency_threshold: usize,
    ) -> Result<Self> {
        let metadata = reaction_database.load_metadata()?;
        if metadata.number_of_species < 0 {
            return Err(SimError::Schema("metadata reports a negative species count".into()));
        }
        let number_of_species = metadata.number_of_species as usize;

        let mut degrees_of_freedom = vec![0i64; number_of_species];
        for row in reaction_database.load_species()? {
            let species = species_index(row.species_id, number_of_species)?;
            degrees_of_freedom[species] = row.degrees_of_freedom;
        }

        let reaction_rows = reaction_database.load_reactions()?;
        let mut reactions = Vec::with_capacity(reaction_rows.len());
        for (index, row) in reaction_rows.iter().enumerate() {
            if row.reaction_id != index as i64 {
                return Err(SimError::Schema(format!(
                    "reaction ids are not contiguous from zero (found {} at position {index})",
                    row.reaction_id
                )));
            }
            let reactants = occupied_slots(
                row.number_of_reactants,
                [row.reactant_1, row.reactant_2],
                number_of_species,
                index,
                "reactant",
            )?;
            let products = occupied_slots(
                row.number_of_products,
                [row.product_1, row.product_2],
                number_of_species,
                index,
                "product",
            )?;
            reactions.push(Reaction {
                reactants,
                products,
                rate: row.rate,
            });
        }

        let mut initial_state = vec![0i64; number_of_species];
        for row in state_database.load_initial_state()? {
            let species = species_index(row.species_id, number_of_species)?;
            if row.count < 0 {
                return Err(SimError::Schema(format!(
                    "initial count for species {species} is negative"
                )));
            }
            initial_state[species] = row.count;
        }

        let factors = state_database.load_factors()?.unwrap_or_default();
        let mut fixed_species = vec![false; number_of_species];
        for species_id in state_database.load_fixed_species()? {
            let species = species_index(species_id, number_of_species)?;
            fixed_species[species] = true;
        }

        Self::new(
            reactions,
            initial_state,
            degrees_of_freedom,
            factors,
            fixed_species,
            dependency_threshold,
        )
    }

    pub fn number_of_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn number_of_species(&self) -> usize {
        self.initial_state.len()
    }

    pub fn reaction(&self, index: usize) -> &Reaction {
        &self.reactions[index]
    }

    pub fn initial_state(&self) -> &[i64] {
        &self.initial_state
    }

    pub fn initial_propensities(&self) -> &[f64] {
        &self.initial_propensities
    }

    pub fn degrees_of_freedom(&self) -> &[i64] {
        &self.degrees_of_freedom
    }

    pub fn dependents(&self, reaction_index: usize) -> &Dependents {
        &self.dependency_graph[reaction_index]
    }

    /// Base rate times the combinatorial factor over the current counts.
    pub fn compute_propensity(&self, state: &[i64], reaction_index: usize) -> f64 {
        let reaction = &self.reactions[reaction_index];
        let factors = &self.factors;
        match reaction.reactants.as_slice() {
            [] => factors.factor_zero * reaction.rate,
            [a] => state[*a] as f64 * reaction.rate,
            [a, b] if a == b => {
                factors.factor_duplicate
                    * factors.factor_two
                    * state[*a] as f64
                    * (state[*a] - 1) as f64
                    * reaction.rate
            }
            [a, b] => factors.factor_two * state[*a] as f64 * state[*b] as f64 * reaction.rate,
            _ => unreachable!("reactions are validated to have at most two reactants"),
        }
    }

    /// Apply one firing to `state` and collect the propensity updates for
    /// every dependent reaction into `updates` (cleared first). A reactant
    /// count that would go negative means the dependency graph or the input
    /// was wrong; that trajectory cannot continue.
    pub fn apply_and_collect_updates(
        &self,
        state: &mut [i64],
        reaction_index: usize,
        updates: &mut Vec<Update>,
    ) -> Result<()> {
        let reaction = &self.reactions[reaction_index];
        for &species in &reaction.reactants {
            if self.fixed_species[species] {
                continue;
            }
            if state[species] == 0 {
                return Err(SimError::InconsistentState(format!(
                    "reaction {reaction_index} fired with species {species} count already zero"
                )));
            }
            state[species] -= 1;
        }
        for &species in &reaction.products {
            if self.fixed_species[species] {
                continue;
            }
            state[species] += 1;
        }

        updates.clear();
        match &self.dependency_graph[reaction_index] {
            Dependents::Listed(dependents) => {
                for &dependent in dependents {
                    updates.push(Update {
                        index: dependent,
                        propensity: self.compute_propensity(state, dependent),
                    });
                }
            }
            Dependents::All => {
                for dependent in 0..self.reactions.len() {
                    updates.push(Update {
                        index: dependent,
                        propensity: self.compute_propensity(state, dependent),
                    });
                }
            }
        }
        Ok(())
    }
}

fn species_index(species_id: i64, number_of_species: usize) -> Result<usize> {
    if species_id < 0 || species_id as usize >= number_of_species {
        return Err(SimError::Schema(format!(
            "species id {species_id} is outside 0..{number_of_species}"
        )));
    }
    Ok(species_id as usize)
}

fn occupied_slots(
    declared: i64,
    slots: [i64; 2],
    number_of_species: usize,
    reaction_index: usize,
    role: &str,
) -> Result<Vec<usize>> {
    if !(0..=2).contains(&declared) {
        return Err(SimError::Schema(format!(
            "reaction {reaction_index} declares {declared} {role}s"
        )));
    }
    let mut species = Vec::with_capacity(declared as usize);
    for &slot in slots.iter().take(declared as usize) {
        if slot < 0 || slot as usize >= number_of_species {
            return Err(SimError::Schema(format!(
                "reaction {reaction_index} {role} id {slot} is outside 0..{number_of_species}"
            )));
        }
        species.push(slot as usize);
    }
    Ok(species)
}

/// Reaction B depends on reaction A iff a reactant of B is a reactant or
/// product of A. Derived once; sets larger than the threshold collapse to
/// the recompute-all sentinel.
fn build_dependency_graph(
    reactions: &[Reaction],
    number_of_species: usize,
    dependency_threshold: usize,
) -> Vec<Dependents> {
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); number_of_species];
    for (index, reaction) in reactions.iter().enumerate() {
        for &species in &reaction.reactants {
            if consumers[species].last() != Some(&index) {
                consumers[species].push(index);
            }
        }
    }

    let mut graph = Vec::with_capacity(reactions.len());
    let mut visit_markers = vec![usize::MAX; reactions.len()];
    for (index, reaction) in reactions.iter().enumerate() {
        let mut dependents = Vec::new();
        for &species in reaction.reactants.iter().chain(reaction.products.iter()) {
            for &consumer in &consumers[species] {
                if visit_markers[consumer] != index {
                    visit_markers[consumer] = index;
                    dependents.push(consumer);
                }
            }
        }
        dependents.sort_unstable();
        if dependents.len() > dependency_threshold {
            graph.push(Dependents::All);
        } else {
            graph.push(Dependents::Listed(dependents));
        }
    }
    graph
}
