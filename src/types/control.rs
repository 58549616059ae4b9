//! Control decision types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a slot was given its setpoint and modulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Rationale {
    Normal,
    PreHeat,
    Setback,
    ForcedMinimumRuntime,
    /// Inputs were unavailable; the previous state is held.
    Degraded,
}

impl std::fmt::Display for Rationale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rationale::Normal => write!(f, "normal"),
            Rationale::PreHeat => write!(f, "pre-heat"),
            Rationale::Setback => write!(f, "setback"),
            Rationale::ForcedMinimumRuntime => write!(f, "forced-minimum-runtime"),
            Rationale::Degraded => write!(f, "degraded"),
        }
    }
}

/// The family of schedule a decision was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Maintain,
    PreHeat,
    Setback,
    Hold,
}

impl std::fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateKind::Maintain => write!(f, "maintain"),
            CandidateKind::PreHeat => write!(f, "pre-heat"),
            CandidateKind::Setback => write!(f, "setback"),
            CandidateKind::Hold => write!(f, "hold"),
        }
    }
}

/// Instruction for one forecast slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDecision {
    pub start: DateTime<Utc>,
    pub duration_hours: f64,
    /// Indoor setpoint (°C)
    pub target_setpoint: f64,
    /// Compressor modulation (0-100 %)
    pub modulation_pct: f64,
    pub rationale: Rationale,
    /// Predicted indoor temperature at the end of the slot (°C)
    pub predicted_indoor_temp: f64,
    /// Predicted electrical energy for the slot (kWh)
    pub predicted_energy_kwh: f64,
    /// Irradiance or wind was missing for this slot
    pub low_confidence: bool,
}

/// A full-horizon schedule. Only the first slot is committed; the rest is
/// advisory and recomputed every tick.
///
/// Decisions are superseded, never mutated, and are shared as `Arc`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDecision {
    pub issued_at: DateTime<Utc>,
    pub tick: u64,
    pub candidate: CandidateKind,
    /// Weighted energy and comfort cost of the chosen schedule
    pub cost: f64,
    /// Version of the learning state whose parameters were used
    pub learning_version: u64,
    pub slots: Vec<SlotDecision>,
    /// Set when the tick ran on fallback data or held state
    pub degraded: Option<DataUnavailable>,
}

impl ControlDecision {
    /// The slot that is sent to the heat pump.
    pub fn current(&self) -> Option<&SlotDecision> {
        self.slots.first()
    }

    pub fn is_hold(&self) -> bool {
        self.candidate == CandidateKind::Hold
    }
}

/// Forecast or telemetry could not be obtained, or was too old to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DataUnavailable {
    #[error("forecast unavailable: {0}")]
    Forecast(String),
    #[error("telemetry unavailable: {0}")]
    Telemetry(String),
    #[error("forecast and telemetry unavailable: {0}")]
    Both(String),
}
