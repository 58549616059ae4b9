//! Persistent storage
//!
//! - `history`: bounded observation store, optionally journal-backed
//! - `journal`: JSON-lines journal with tail recovery
//! - `lockfile`: single-instance guard for the data directory
//!
//! Learning-state persistence lives with the learning engine in
//! `ml_engine::storage`.

pub mod history;
pub mod journal;
pub mod lockfile;

pub use history::{HistoricalDataStore, StoreError, StoreStats};
pub use journal::{JournalError, JournalRecovery};
pub use lockfile::ProcessLock;

/// History journal file name inside the data directory.
pub const HISTORY_JOURNAL_FILE: &str = "history.jsonl";

/// Learning-state database directory inside the data directory.
pub const LEARNING_DB_DIR: &str = "learning_state.db";
