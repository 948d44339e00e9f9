//! Durable storage of the medication list and adherence counters.
//!
//! Two JSON values under fixed keys of the key-value store. Loading a store
//! that has never been written yields an empty list and zeroed counters.

use std::path::Path;

use rusqlite::Connection;
use thiserror::Error;

use crate::db::{self, DatabaseError, ADHERENCE_KEY, MEDICATIONS_KEY};
use crate::models::{AdherenceCounters, Medication};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Stored value under {key:?} is not valid JSON: {source}")]
    Corrupt {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything a session restores on start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredState {
    pub medications: Vec<Medication>,
    pub counters: AdherenceCounters,
}

pub trait Persistence: Send {
    fn load(&self) -> Result<StoredState, PersistenceError>;
    fn save(
        &mut self,
        medications: &[Medication],
        counters: &AdherenceCounters,
    ) -> Result<(), PersistenceError>;
}

// ═══════════════════════════════════════════
// SQLite
// ═══════════════════════════════════════════

pub struct SqlitePersistence {
    conn: Connection,
}

impl SqlitePersistence {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let conn = db::open_database(path)?;
        tracing::debug!(path = %path.display(), "Persistence opened");
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }
}

fn decode<T: serde::de::DeserializeOwned + Default>(
    raw: Option<String>,
    key: &'static str,
) -> Result<T, PersistenceError> {
    match raw {
        Some(json) => {
            serde_json::from_str(&json).map_err(|source| PersistenceError::Corrupt { key, source })
        }
        None => Ok(T::default()),
    }
}

impl Persistence for SqlitePersistence {
    fn load(&self) -> Result<StoredState, PersistenceError> {
        let medications = decode(db::get_value(&self.conn, MEDICATIONS_KEY)?, MEDICATIONS_KEY)?;
        let counters = decode(db::get_value(&self.conn, ADHERENCE_KEY)?, ADHERENCE_KEY)?;
        Ok(StoredState {
            medications,
            counters,
        })
    }

    fn save(
        &mut self,
        medications: &[Medication],
        counters: &AdherenceCounters,
    ) -> Result<(), PersistenceError> {
        let meds_json = serde_json::to_string(medications)?;
        let counters_json = serde_json::to_string(counters)?;
        db::set_values(
            &mut self.conn,
            &[
                (MEDICATIONS_KEY, meds_json.as_str()),
                (ADHERENCE_KEY, counters_json.as_str()),
            ],
        )?;
        Ok(())
    }
}

// ═══════════════════════════════════════════
// In-memory
// ═══════════════════════════════════════════

/// Volatile store for tests and `--ephemeral` sessions.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    state: StoredState,
    saves: usize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: StoredState) -> Self {
        Self { state, saves: 0 }
    }

    pub fn state(&self) -> &StoredState {
        &self.state
    }

    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> Result<StoredState, PersistenceError> {
        Ok(self.state.clone())
    }

    fn save(
        &mut self,
        medications: &[Medication],
        counters: &AdherenceCounters,
    ) -> Result<(), PersistenceError> {
        self.state = StoredState {
            medications: medications.to_vec(),
            counters: counters.clone(),
        };
        self.saves += 1;
        Ok(())
    }
}
