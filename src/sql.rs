//! Narrow persistence façade over the two SQLite databases: the read-only
//! reaction database and the read-write initial-state database that also
//! receives the trajectories.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::info;

use crate::network::RateFactors;
use crate::simulation::HistoryPacket;
use crate::{Result, SimError};

#[derive(Clone, Copy, Debug)]
pub struct MetadataRow {
    pub number_of_species: i64,
    pub number_of_sites: i64,
    pub number_of_interactions: i64,
}

#[derive(Clone, Copy, Debug)]
pub struct SpeciesRow {
    pub species_id: i64,
    pub degrees_of_freedom: i64,
}

/// Unused reactant/product slots hold -1.
#[derive(Clone, Copy, Debug)]
pub struct ReactionRow {
    pub reaction_id: i64,
    pub number_of_reactants: i64,
    pub number_of_products: i64,
    pub reactant_1: i64,
    pub reactant_2: i64,
    pub product_1: i64,
    pub product_2: i64,
    pub rate: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct InitialStateRow {
    pub species_id: i64,
    pub count: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrajectoryRow {
    pub seed: i64,
    pub step: i64,
    pub reaction_id: i64,
    pub time: f64,
}

/// Read-only view of the reaction network database.
pub struct ReactionDatabase {
    connection: Connection,
}

impl ReactionDatabase {
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|err| {
                SimError::Config(format!(
                    "cannot open reaction database {}: {err}",
                    path.display()
                ))
            })?;
        Ok(Self { connection })
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn load_metadata(&self) -> Result<MetadataRow> {
        self.connection
            .query_row(
                "SELECT number_of_species, number_of_sites, number_of_interactions FROM metadata",
                [],
                |row| {
                    Ok(MetadataRow {
                        number_of_species: row.get(0)?,
                        number_of_sites: row.get(1)?,
                        number_of_interactions: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| SimError::Schema("metadata table is empty".into()))
    }

    pub fn load_species(&self) -> Result<Vec<SpeciesRow>> {
        let mut statement = self
            .connection
            .prepare("SELECT species_id, degrees_of_freedom FROM species")?;
        let rows = statement.query_map([], |row| {
            Ok(SpeciesRow {
                species_id: row.get(0)?,
                degrees_of_freedom: row.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn load_reactions(&self) -> Result<Vec<ReactionRow>> {
        let mut statement = self.connection.prepare(
            "SELECT reaction_id, number_of_reactants, number_of_products, \
             reactant_1, reactant_2, product_1, product_2, rate \
             FROM reactions ORDER BY reaction_id",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(ReactionRow {
                reaction_id: row.get(0)?,
                number_of_reactants: row.get(1)?,
                number_of_products: row.get(2)?,
                reactant_1: row.get(3)?,
                reactant_2: row.get(4)?,
                product_1: row.get(5)?,
                product_2: row.get(6)?,
                rate: row.get(7)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }
}

/// Read-write view of the initial-state database. Holds the only write
/// connection in the process; owned by the dispatcher thread.
pub struct StateDatabase {
    connection: Connection,
}

impl StateDatabase {
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)
            .map_err(|err| {
                SimError::Config(format!(
                    "cannot open initial state database {}: {err}",
                    path.display()
                ))
            })?;
        Ok(Self { connection })
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn load_initial_state(&self) -> Result<Vec<InitialStateRow>> {
        let mut statement = self
            .connection
            .prepare("SELECT species_id, count FROM initial_state")?;
        let rows = statement.query_map([], |row| {
            Ok(InitialStateRow {
                species_id: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// The factors table is optional; absent means plain mass-action
    /// defaults.
    pub fn load_factors(&self) -> Result<Option<RateFactors>> {
        if !self.table_exists("factors")? {
            return Ok(None);
        }
        self.connection
            .query_row(
                "SELECT factor_zero, factor_two, factor_duplicate FROM factors",
                [],
                |row| {
                    Ok(RateFactors {
                        factor_zero: row.get(0)?,
                        factor_two: row.get(1)?,
                        factor_duplicate: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Species whose counts are pinned during simulation; the table is
    /// optional and usually absent.
    pub fn load_fixed_species(&self) -> Result<Vec<i64>> {
        if !self.table_exists("fixed_state")? {
            return Ok(Vec::new());
        }
        let mut statement = self
            .connection
            .prepare("SELECT species_id FROM fixed_state")?;
        let rows = statement.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn ensure_trajectories_table(&self) -> Result<()> {
        self.connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS trajectories (\
             seed INTEGER NOT NULL, \
             step INTEGER NOT NULL, \
             reaction_id INTEGER NOT NULL, \
             time REAL NOT NULL);",
        )?;
        Ok(())
    }

    /// Write one trajectory inside a single transaction so partial
    /// trajectories are never visible.
    pub fn write_trajectory(&mut self, packet: &HistoryPacket) -> Result<()> {
        let transaction = self.connection.transaction()?;
        {
            let mut statement = transaction.prepare_cached(
                "INSERT INTO trajectories (seed, step, reaction_id, time) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (step, element) in packet.history.iter().enumerate() {
                statement.execute(params![
                    packet.seed as i64,
                    step as i64,
                    element.reaction_id as i64,
                    element.time,
                ])?;
            }
        }
        transaction.commit()?;
        info!(
            seed = packet.seed,
            events = packet.history.len(),
            "wrote trajectory"
        );
        Ok(())
    }

    /// Remove rows sharing `(seed, step)`, keeping the earliest insert.
    /// Idempotent; the single-writer design should make duplicates
    /// unreachable, this is the safety net.
    pub fn deduplicate_trajectories(&self) -> Result<usize> {
        let removed = self.connection.execute(
            "DELETE FROM trajectories WHERE rowid NOT IN \
             (SELECT MIN(rowid) FROM trajectories GROUP BY seed, step)",
            [],
        )?;
        Ok(removed)
    }

    pub fn trajectory_rows(&self) -> Result<Vec<TrajectoryRow>> {
        let mut statement = self.connection.prepare(
            "SELECT seed, step, reaction_id, time FROM trajectories ORDER BY seed, step, rowid",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(TrajectoryRow {
                seed: row.get(0)?,
                step: row.get(1)?,
                reaction_id: row.get(2)?,
                time: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.connection.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
