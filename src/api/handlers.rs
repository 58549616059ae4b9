//! API route handlers
//!
//! Every handler reads published snapshots (`StatusHandle`, the learning
//! engine's `ArcSwap`, a history copy) and never waits on a control tick.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::background::{HealthBoard, HealthEvent, HealthStatus};
use crate::ml_engine::LearningEngine;
use crate::pipeline::{Clock, LoopStatus, RetrainSummary, StatusHandle};
use crate::storage::{HistoricalDataStore, StoreStats};
use crate::types::{CandidateKind, ControlDecision, DataUnavailable, LearningState, ObservationRecord, SlotDecision};

/// Default window for `/history` (hours).
const DEFAULT_HISTORY_HOURS: u32 = 24;

/// Largest window `/history` will return (hours).
const MAX_HISTORY_HOURS: u32 = 24 * 366;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub status: Arc<StatusHandle>,
    pub health: Arc<HealthBoard>,
    pub engine: Arc<LearningEngine>,
    pub history: Arc<HistoricalDataStore>,
    pub clock: Arc<dyn Clock>,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub health: HealthStatus,
    pub uptime_secs: i64,
    pub events: Vec<HealthEvent>,
}

/// GET /api/v1/health
///
/// 503 while a repeated tick failure is raised.
pub async fn get_health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.health.status();
    let code = match health {
        HealthStatus::Unhealthy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    let uptime_secs = (state.clock.now() - state.status.started_at()).num_seconds();
    (
        code,
        Json(HealthResponse {
            health,
            uptime_secs,
            events: state.health.events(),
        }),
    )
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LearningSummary {
    pub version: u64,
    pub confidence_score: f64,
    pub sample_count: usize,
    pub last_trained_at: Option<DateTime<Utc>>,
}

impl From<&LearningState> for LearningSummary {
    fn from(state: &LearningState) -> Self {
        Self {
            version: state.version,
            confidence_score: state.confidence_score,
            sample_count: state.sample_count,
            last_trained_at: state.last_trained_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub started_at: DateTime<Utc>,
    pub health: HealthStatus,
    #[serde(rename = "loop")]
    pub loop_status: Arc<LoopStatus>,
    pub learning: LearningSummary,
    pub history: StoreStats,
    pub last_retrain: Option<Arc<RetrainSummary>>,
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        started_at: state.status.started_at(),
        health: state.health.status(),
        loop_status: state.status.loop_status(),
        learning: LearningSummary::from(state.engine.snapshot().as_ref()),
        history: state.history.stats(),
        last_retrain: state.status.last_retrain(),
    })
}

// ============================================================================
// Decision / Schedule
// ============================================================================

/// The committed slot and where it came from.
#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub issued_at: DateTime<Utc>,
    pub tick: u64,
    pub candidate: CandidateKind,
    pub learning_version: u64,
    pub current: SlotDecision,
    pub degraded: Option<DataUnavailable>,
}

/// GET /api/v1/decision - 404 until the first tick has run
pub async fn get_decision(State(state): State<ApiState>) -> Result<Json<DecisionResponse>, StatusCode> {
    let decision = state.status.decision().ok_or(StatusCode::NOT_FOUND)?;
    let current = decision.current().cloned().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(DecisionResponse {
        issued_at: decision.issued_at,
        tick: decision.tick,
        candidate: decision.candidate,
        learning_version: decision.learning_version,
        current,
        degraded: decision.degraded.clone(),
    }))
}

/// GET /api/v1/schedule - full advisory horizon
pub async fn get_schedule(State(state): State<ApiState>) -> Result<Json<Arc<ControlDecision>>, StatusCode> {
    state.status.decision().map(Json).ok_or(StatusCode::NOT_FOUND)
}

// ============================================================================
// Learning
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LearningResponse {
    pub state: Arc<LearningState>,
    pub last_retrain: Option<Arc<RetrainSummary>>,
}

/// GET /api/v1/learning
pub async fn get_learning(State(state): State<ApiState>) -> Json<LearningResponse> {
    Json(LearningResponse {
        state: state.engine.snapshot(),
        last_retrain: state.status.last_retrain(),
    })
}

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub hours: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub hours: u32,
    pub count: usize,
    /// Mean absolute prediction error over the window (K)
    pub mean_abs_error: Option<f64>,
    pub records: Vec<ObservationRecord>,
}

/// GET /api/v1/history?hours=N
pub async fn get_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let hours = query
        .hours
        .unwrap_or(DEFAULT_HISTORY_HOURS)
        .clamp(1, MAX_HISTORY_HOURS);
    let now = state.clock.now();
    let records = state
        .history
        .query_range(now - Duration::hours(i64::from(hours)), now);

    let mean_abs_error = if records.is_empty() {
        None
    } else {
        Some(records.iter().map(|r| r.prediction_error().abs()).mean())
    };

    Json(HistoryResponse {
        hours,
        count: records.len(),
        mean_abs_error,
        records,
    })
}
