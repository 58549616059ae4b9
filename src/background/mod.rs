//! Background services - health signals and overall status
//!
//! The control loop and startup recovery report health transitions here;
//! the API reads the board.

pub mod health;

pub use health::{HealthBoard, HealthEvent, HealthSignal, HealthStatus, TickFailureTracker};
