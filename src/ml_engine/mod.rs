//! Learning Engine for thermal parameter estimation
//!
//! Fits a bagged regression-tree ensemble on operating history and reads
//! the building's physical parameters back off its sensitivities. The
//! control loop never waits on this module: it reads the last published
//! `LearningState` snapshot.
//!
//! ## Architecture
//! - `quality_filter`: drops implausible or stale observation records
//! - `features`: feature rows and heating-rate / power targets
//! - `forest`: regression forest, trees fitted in parallel (rayon)
//! - `sensitivity`: percentile-to-percentile slopes (statrs)
//! - `engine`: retrain orchestration, blending, atomic publication
//! - `scheduler`: interval / sample-count retrain trigger
//! - `storage`: versioned learning-state persistence (sled)

pub mod engine;
pub mod features;
pub mod forest;
pub mod quality_filter;
pub mod scheduler;
pub mod sensitivity;
pub mod storage;

pub use engine::{DerivedParameters, LearningEngine, LearningError, RetrainOutcome, RetrainReport};
pub use forest::{FitError, ForestParams, RegressionForest};
pub use quality_filter::DataQualityFilter;
pub use scheduler::{get_interval_secs, LearningScheduler, RetrainPolicy};
pub use storage::{CorruptEntry, LearningStateStore, LoadedState, StateStoreError};
