//! Learning State Storage
//!
//! Every published `LearningState` is kept in a Sled embedded database.
//! Key format: the state version as a big-endian `u64`, so byte order equals
//! version order and the newest state is the last key.
//!
//! Loading walks backwards from the newest key and returns the first state
//! that decodes; undecodable entries are reported to the caller rather than
//! failing startup.

use std::path::Path;

use sled::Db;
use thiserror::Error;
use tracing::{debug, error};

use crate::types::LearningState;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An entry that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptEntry {
    /// Version from the key, `None` when the key itself is malformed
    pub version: Option<u64>,
    pub reason: String,
}

/// Result of `load_latest`.
#[derive(Debug, Clone, Default)]
pub struct LoadedState {
    pub state: Option<LearningState>,
    /// Newer entries that were skipped on the way to `state`
    pub skipped: Vec<CorruptEntry>,
}

impl LoadedState {
    pub fn is_corrupt(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Versioned learning-state persistence
pub struct LearningStateStore {
    db: Db,
}

impl LearningStateStore {
    /// Open or create the learning-state database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StateStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing)
    pub fn open_temp() -> Result<Self, StateStoreError> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Ok(Self { db })
    }

    fn key(version: u64) -> [u8; 8] {
        version.to_be_bytes()
    }

    /// Persist a state under its version, replacing any previous value.
    pub fn store(&self, state: &LearningState) -> Result<(), StateStoreError> {
        let value = serde_json::to_vec(state)?;
        self.db.insert(Self::key(state.version), value)?;
        self.db.flush()?;
        debug!(version = state.version, "Stored learning state");
        Ok(())
    }

    /// Newest decodable state.
    pub fn load_latest(&self) -> Result<LoadedState, StateStoreError> {
        let mut loaded = LoadedState::default();

        for entry in self.db.iter().rev() {
            let (key, value) = entry?;
            let version = <[u8; 8]>::try_from(key.as_ref()).ok().map(u64::from_be_bytes);

            match (version, serde_json::from_slice::<LearningState>(&value)) {
                (Some(v), Ok(state)) if state.version == v => {
                    loaded.state = Some(state);
                    break;
                }
                (Some(v), Ok(state)) => loaded.skipped.push(CorruptEntry {
                    version: Some(v),
                    reason: format!("key version {} holds state version {}", v, state.version),
                }),
                (version, Err(e)) => loaded.skipped.push(CorruptEntry {
                    version,
                    reason: e.to_string(),
                }),
                (None, Ok(_)) => loaded.skipped.push(CorruptEntry {
                    version: None,
                    reason: format!("malformed key of {} bytes", key.len()),
                }),
            }
        }

        for skipped in &loaded.skipped {
            error!(
                version = ?skipped.version,
                reason = %skipped.reason,
                "Skipping corrupt learning state entry"
            );
        }
        Ok(loaded)
    }

    /// Number of stored versions
    pub fn count(&self) -> usize {
        self.db.len()
    }

    /// Drop all but the newest `keep` versions.
    pub fn prune(&self, keep: usize) -> Result<usize, StateStoreError> {
        let total = self.db.len();
        let mut removed = 0;
        for entry in self.db.iter().take(total.saturating_sub(keep)) {
            let (key, _) = entry?;
            self.db.remove(key)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Write raw bytes under a version key.
    #[cfg(test)]
    fn insert_raw(&self, version: u64, bytes: &[u8]) -> Result<(), StateStoreError> {
        self.db.insert(Self::key(version), bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BuildingMass, CopCurve, ThermalParameters};

    fn make_state(version: u64, lag: f64) -> LearningState {
        let mut state = LearningState::prior(ThermalParameters {
            thermal_lag_hours: lag,
            solar_gain_factor: 0.2,
            wind_factor: 0.05,
            building_thermal_mass: BuildingMass::High,
            cop_curve: CopCurve::constant(3.5),
        });
        state.version = version;
        state.confidence_score = 0.6;
        state
    }

    #[test]
    fn test_latest_version_wins() {
        let store = LearningStateStore::open_temp().unwrap();
        // 256 sorts after 2 only with big-endian keys
        for (v, lag) in [(2, 3.0), (256, 5.0), (9, 4.0)] {
            store.store(&make_state(v, lag)).unwrap();
        }
        let loaded = store.load_latest().unwrap();
        assert!(!loaded.is_corrupt());
        assert_eq!(loaded.state.unwrap().version, 256);
    }

    #[test]
    fn test_corrupt_entry_skipped_and_reported() {
        let store = LearningStateStore::open_temp().unwrap();
        store.store(&make_state(1, 3.0)).unwrap();
        store.store(&make_state(2, 4.0)).unwrap();
        store.insert_raw(3, b"{not json").unwrap();

        let loaded = store.load_latest().unwrap();
        assert_eq!(loaded.skipped.len(), 1);
        assert_eq!(loaded.skipped[0].version, Some(3));
        assert_eq!(loaded.state.unwrap().version, 2);
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let store = LearningStateStore::open_temp().unwrap();
        let loaded = store.load_latest().unwrap();
        assert!(loaded.state.is_none());
        assert!(!loaded.is_corrupt());
    }

    #[test]
    fn test_prune_keeps_newest() {
        let store = LearningStateStore::open_temp().unwrap();
        for v in 1..=10 {
            store.store(&make_state(v, 4.0)).unwrap();
        }
        assert_eq!(store.prune(3).unwrap(), 7);
        assert_eq!(store.count(), 3);
        assert_eq!(store.load_latest().unwrap().state.unwrap().version, 10);
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learning_state.db");
        {
            let store = LearningStateStore::open(&path).unwrap();
            store.store(&make_state(4, 6.5)).unwrap();
        }
        let store = LearningStateStore::open(&path).unwrap();
        let state = store.load_latest().unwrap().state.unwrap();
        assert_eq!(state.version, 4);
        assert_eq!(state.params.thermal_lag_hours, 6.5);
    }
}
