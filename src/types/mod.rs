//! Shared data structures for the predictive control engine
//!
//! - `weather`: WeatherPoint, Forecast, ForecastSlot
//! - `thermal`: ThermalParameters, COP curve, building classes
//! - `observation`: Telemetry, ObservationRecord
//! - `control`: ControlDecision, SlotDecision, Rationale
//! - `learning`: LearningState

pub mod control;
pub mod learning;
pub mod observation;
pub mod thermal;
pub mod weather;

pub use control::*;
pub use learning::*;
pub use observation::*;
pub use thermal::*;
pub use weather::*;
