//! Controller status snapshots
//!
//! Shared between the control loop, the retrain task and the API handlers.
//! Every value is published by atomic pointer swap, so readers never wait
//! on a tick and never see a half-written decision.

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ml_engine::RetrainOutcome;
use crate::types::{ControlDecision, DataUnavailable, Telemetry};

/// Per-tick counters published by the control loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStatus {
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_committed_modulation: Option<f64>,
    /// When the compressor last went from off to on
    pub running_since: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub degraded: Option<DataUnavailable>,
    pub last_telemetry: Option<Telemetry>,
    pub last_commit_error: Option<String>,
    pub observations_recorded: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrainSummary {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: RetrainOutcome,
}

/// Handle to the published controller state.
#[derive(Debug)]
pub struct StatusHandle {
    started_at: DateTime<Utc>,
    decision: ArcSwapOption<ControlDecision>,
    loop_status: ArcSwap<LoopStatus>,
    last_retrain: ArcSwapOption<RetrainSummary>,
}

impl StatusHandle {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            decision: ArcSwapOption::empty(),
            loop_status: ArcSwap::from_pointee(LoopStatus::default()),
            last_retrain: ArcSwapOption::empty(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn publish_decision(&self, decision: Arc<ControlDecision>) {
        self.decision.store(Some(decision));
    }

    /// Latest full-horizon decision.
    pub fn decision(&self) -> Option<Arc<ControlDecision>> {
        self.decision.load_full()
    }

    pub fn publish_loop_status(&self, status: LoopStatus) {
        self.loop_status.store(Arc::new(status));
    }

    pub fn loop_status(&self) -> Arc<LoopStatus> {
        self.loop_status.load_full()
    }

    pub fn record_retrain(&self, at: DateTime<Utc>, outcome: RetrainOutcome) {
        self.last_retrain.store(Some(Arc::new(RetrainSummary { at, outcome })));
    }

    pub fn last_retrain(&self) -> Option<Arc<RetrainSummary>> {
        self.last_retrain.load_full()
    }
}
