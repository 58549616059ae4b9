//! Control Pipeline
//!
//! ```text
//! ForecastSource ─┐
//!                 ├─> PredictiveController::tick ─> CommandSink
//! TelemetrySource ┘            │
//!                              ├─> StatusHandle (decision, loop status)
//!                              └─> HistoricalDataStore (observations)
//! ```
//!
//! `ControlLoop` runs the controller on its tick; everything the API reads
//! goes through `StatusHandle`.

pub mod clock;
mod controller;
pub mod processing_loop;
pub mod source;
mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{Collaborators, PredictiveController, SharedState, TickReport};
pub use processing_loop::{ControlLoop, LoopStats};
pub use source::{CommandSink, FeedMessage, ForecastSource, JsonLinesFeed, StdoutSink, TelemetrySource};
pub use state::{LoopStatus, RetrainSummary, StatusHandle};
