//! Feature extraction for the learning engine
//!
//! Each observation becomes one row of five features. Two targets are
//! derived: the indoor heating rate (K/h) for every record, and the
//! electrical power draw (kW) for records where the heat pump was running
//! and power was measured.

use super::forest::FeatureVector;
use crate::types::ObservationRecord;

pub const OUTDOOR: usize = 0;
pub const WIND: usize = 1;
pub const SOLAR: usize = 2;
pub const MODULATION: usize = 3;
pub const PRIOR_INDOOR: usize = 4;

pub const FEATURE_NAMES: [&str; 5] = [
    "outdoor_temp",
    "wind_speed",
    "solar_irradiance",
    "modulation_pct",
    "prior_indoor_temp",
];

/// Power readings at or below this are treated as "not running" (kW).
const MIN_RUNNING_POWER_KW: f64 = 0.05;

/// Modulation at or below this is treated as off (%).
const MIN_RUNNING_MODULATION_PCT: f64 = 1.0;

pub fn feature_vector(r: &ObservationRecord) -> FeatureVector {
    let mut x = [0.0; 5];
    x[OUTDOOR] = r.outdoor_temp;
    x[WIND] = r.wind_speed.unwrap_or(0.0);
    x[SOLAR] = r.solar_irradiance.unwrap_or(0.0);
    x[MODULATION] = r.heat_pump_modulation_pct;
    x[PRIOR_INDOOR] = r.prior_indoor_temp;
    x
}

/// Indoor temperature change per hour over the record's interval.
pub fn heating_rate(r: &ObservationRecord) -> f64 {
    (r.indoor_temp - r.prior_indoor_temp) / r.interval_hours
}

/// Measured power when the record qualifies as a running sample.
fn running_power(r: &ObservationRecord) -> Option<f64> {
    r.measured_power
        .filter(|p| p.is_finite() && *p > MIN_RUNNING_POWER_KW)
        .filter(|_| r.heat_pump_modulation_pct > MIN_RUNNING_MODULATION_PCT)
}

/// Rows and targets ready for fitting.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub rows: Vec<FeatureVector>,
    pub rates: Vec<f64>,
    pub intervals: Vec<f64>,
    pub prior_indoor: Vec<f64>,
    pub actual_indoor: Vec<f64>,
    pub power_rows: Vec<FeatureVector>,
    pub power_targets: Vec<f64>,
}

impl TrainingSet {
    pub fn build<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ObservationRecord>,
    {
        let mut set = Self::default();
        for r in records {
            let x = feature_vector(r);
            set.rows.push(x);
            set.rates.push(heating_rate(r));
            set.intervals.push(r.interval_hours);
            set.prior_indoor.push(r.prior_indoor_temp);
            set.actual_indoor.push(r.indoor_temp);
            if let Some(power) = running_power(r) {
                set.power_rows.push(x);
                set.power_targets.push(power);
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one feature across all rows.
    pub fn column(&self, feature: usize) -> Vec<f64> {
        self.rows.iter().map(|x| x[feature]).collect()
    }
}
