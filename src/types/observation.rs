//! Telemetry and observation records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live heat-pump state as reported by the telemetry collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub timestamp: DateTime<Utc>,
    /// Indoor air temperature (°C)
    pub indoor_temp: f64,
    /// Current compressor modulation (0-100 %)
    pub modulation_pct: f64,
    /// Electrical power draw (kW)
    #[serde(default)]
    pub power_kw: Option<f64>,
    /// Flow (outlet) water temperature (°C)
    #[serde(default)]
    pub outlet_temp: Option<f64>,
    /// Return (inlet) water temperature (°C)
    #[serde(default)]
    pub inlet_temp: Option<f64>,
}

/// What the controller expected against what the house actually did over
/// one tick interval. Appended once per tick, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// Time of the telemetry reading that closed the interval
    pub timestamp: DateTime<Utc>,
    /// Measured indoor temperature at the end of the interval (°C)
    pub indoor_temp: f64,
    /// Measured indoor temperature at the start of the interval (°C)
    pub prior_indoor_temp: f64,
    /// Model prediction for `indoor_temp` (°C)
    pub predicted_indoor_temp: f64,
    pub outdoor_temp: f64,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub solar_irradiance: Option<f64>,
    /// Setpoint committed for the interval (°C)
    pub target_temp: f64,
    /// Modulation committed for the interval (%)
    pub heat_pump_modulation_pct: f64,
    /// Measured electrical power (kW)
    #[serde(default)]
    pub measured_power: Option<f64>,
    /// Delivered heat over electrical power, when power was measurable
    #[serde(default)]
    pub derived_cop: Option<f64>,
    /// Length of the interval (hours)
    pub interval_hours: f64,
}

impl ObservationRecord {
    /// Signed prediction error (actual minus predicted, K).
    pub fn prediction_error(&self) -> f64 {
        self.indoor_temp - self.predicted_indoor_temp
    }
}
