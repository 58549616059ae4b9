//! heatwise: predictive heat-pump control
//!
//! Plans heat-pump modulation over a forecast horizon using a learned
//! first-order thermal model of the house.
//!
//! ## Architecture
//!
//! - **Thermal Model**: indoor-temperature prediction for a modulation schedule
//! - **Optimization**: candidate plans, constraint tracking and cost-based selection
//! - **Pipeline**: the periodic control tick and its collaborators
//! - **ML Engine**: periodic retraining of the thermal parameters from history
//! - **Storage**: bounded observation history with a crash-tolerant journal
//! - **API**: read-only status endpoints

pub mod api;
pub mod background;
pub mod config;
pub mod ml_engine;
pub mod optimization;
pub mod pipeline;
pub mod simulation;
pub mod startup;
pub mod storage;
pub mod thermal_model;
pub mod types;

pub use config::SystemConfig;

pub use types::{
    CandidateKind, ControlDecision, DataUnavailable, Forecast, LearningState, ObservationRecord,
    Rationale, SlotDecision, Telemetry, ThermalParameters, WeatherPoint,
};

pub use background::{HealthBoard, HealthSignal, HealthStatus};
pub use ml_engine::{LearningEngine, LearningScheduler};
pub use optimization::ScheduleOptimizer;
pub use pipeline::{ControlLoop, PredictiveController};
pub use storage::HistoricalDataStore;
pub use thermal_model::ThermalModel;
