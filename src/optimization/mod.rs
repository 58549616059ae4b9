//! Schedule Optimization
//!
//! Turns a forecast, the current house state and the learned parameters
//! into a per-slot setpoint and modulation schedule. Entirely algorithmic
//! and deterministic: identical inputs produce identical schedules.
//!
//! - `comfort`: comfort reference and day/night windows
//! - `candidates`: maintain, pre-heat and setback plans
//! - `constraints`: modulation cap, minimum runtime, setback-window limit
//! - `cost`: weighted energy and comfort cost
//! - `optimizer`: evaluation and tie-broken selection

pub mod candidates;
pub mod comfort;
pub mod constraints;
pub mod cost;
mod optimizer;

pub use candidates::{CandidateGenerator, CandidatePlan, PlanInputs};
pub use comfort::ComfortProfile;
pub use constraints::{is_off, ModulationLimits};
pub use cost::{CostBreakdown, CostWeights};
pub use optimizer::{align_to_now, select, EvaluatedCandidate, ScheduleOptimizer};
