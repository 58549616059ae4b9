//! Startup recovery
//!
//! Opens the persistent stores in the data directory and restores the
//! learning engine. Anything that had to be discarded on the way is
//! reported to the health board as persistence corruption; recovery itself
//! never stops startup unless a store cannot be opened at all.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::background::{HealthBoard, HealthSignal};
use crate::ml_engine::{LearningEngine, LearningStateStore};
use crate::storage::{HistoricalDataStore, HISTORY_JOURNAL_FILE, LEARNING_DB_DIR};

/// Component names used in corruption signals.
pub const HISTORY_COMPONENT: &str = "history_journal";
pub const LEARNING_COMPONENT: &str = "learning_state";

pub struct DataStores {
    pub history: Arc<HistoricalDataStore>,
    pub learning: Arc<LearningStateStore>,
}

/// Open the history journal and learning-state database under `data_dir`.
pub fn open_data_stores(
    data_dir: &Path,
    history_capacity: usize,
    health: &HealthBoard,
    now: DateTime<Utc>,
) -> Result<DataStores> {
    let journal_path = data_dir.join(HISTORY_JOURNAL_FILE);
    let (history, recovery) = HistoricalDataStore::open(&journal_path, history_capacity)
        .with_context(|| format!("Failed to open history journal {}", journal_path.display()))?;
    info!(
        records = history.len(),
        path = %journal_path.display(),
        "History store opened"
    );
    if !recovery.is_clean() {
        health.emit(
            HealthSignal::PersistenceCorruption {
                component: HISTORY_COMPONENT.to_string(),
                detail: format!(
                    "{} unreadable line(s) ({} bytes) truncated from journal tail",
                    recovery.discarded_lines, recovery.truncated_bytes
                ),
            },
            now,
        );
    }

    let db_path = data_dir.join(LEARNING_DB_DIR);
    let learning = LearningStateStore::open(&db_path)
        .with_context(|| format!("Failed to open learning-state database {}", db_path.display()))?;

    Ok(DataStores {
        history: Arc::new(history),
        learning: Arc::new(learning),
    })
}

/// Restore the newest decodable learning state into `engine`.
///
/// Returns the restored version, or `None` when the engine keeps its prior.
pub fn restore_learning_state(
    engine: &LearningEngine,
    store: &LearningStateStore,
    health: &HealthBoard,
    now: DateTime<Utc>,
) -> Option<u64> {
    let loaded = match store.load_latest() {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, "Failed to read learning-state database, starting from prior");
            health.emit(
                HealthSignal::PersistenceCorruption {
                    component: LEARNING_COMPONENT.to_string(),
                    detail: e.to_string(),
                },
                now,
            );
            return None;
        }
    };

    for entry in &loaded.skipped {
        let version = entry
            .version
            .map_or_else(|| "unknown".to_string(), |v| v.to_string());
        health.emit(
            HealthSignal::PersistenceCorruption {
                component: LEARNING_COMPONENT.to_string(),
                detail: format!("version {} skipped: {}", version, entry.reason),
            },
            now,
        );
    }

    let state = loaded.state?;
    let version = state.version;
    info!(
        version,
        confidence = state.confidence_score,
        samples = state.sample_count,
        "Learning state restored"
    );
    engine.restore(state);
    Some(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use crate::types::LearningState;

    fn make_engine() -> LearningEngine {
        let config = SystemConfig::default();
        LearningEngine::new(config.learning.clone(), Default::default(), config.prior_parameters())
    }

    #[test]
    fn test_restore_newest_state() {
        let store = LearningStateStore::open_temp().unwrap();
        let engine = make_engine();
        let mut state = LearningState::prior(engine.snapshot().params.clone());
        state.version = 4;
        state.confidence_score = 0.6;
        store.store(&state).unwrap();

        let health = HealthBoard::new();
        assert_eq!(restore_learning_state(&engine, &store, &health, Utc::now()), Some(4));
        assert_eq!(engine.version(), 4);
        assert!(health.events().is_empty());
    }

    #[test]
    fn test_empty_store_keeps_prior() {
        let store = LearningStateStore::open_temp().unwrap();
        let engine = make_engine();
        let health = HealthBoard::new();
        assert_eq!(restore_learning_state(&engine, &store, &health, Utc::now()), None);
        assert_eq!(engine.version(), 0);
    }
}
