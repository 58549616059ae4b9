//! API route definitions
//!
//! - /api/v1/health - health status and recent health events
//! - /api/v1/status - loop counters, learning summary, history stats
//! - /api/v1/decision - the committed slot
//! - /api/v1/schedule - the full advisory horizon
//! - /api/v1/learning - the published learning state
//! - /api/v1/history?hours=N - recent observation records

use axum::{routing::get, Router};

use super::handlers::{self, ApiState};

/// Create all API routes
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/status", get(handlers::get_status))
        .route("/decision", get(handlers::get_decision))
        .route("/schedule", get(handlers::get_schedule))
        .route("/learning", get(handlers::get_learning))
        .route("/history", get(handlers::get_history))
        .with_state(state)
}
