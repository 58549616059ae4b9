//! Schedule cost: weighted energy plus squared comfort violation

use serde::Serialize;

use super::comfort::ComfortProfile;
use crate::config::ControlConfig;
use crate::thermal_model::SimulatedSlot;
use crate::types::ForecastSlot;

/// A modulation step larger than this counts as a change (%).
const CHANGE_THRESHOLD_PCT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostWeights {
    pub energy_weight: f64,
    pub comfort_weight: f64,
    /// Deviation from the comfort reference that costs nothing (K)
    pub deadband: f64,
}

impl From<&ControlConfig> for CostWeights {
    fn from(cfg: &ControlConfig) -> Self {
        Self {
            energy_weight: cfg.energy_weight,
            comfort_weight: cfg.comfort_weight,
            deadband: cfg.comfort_deadband_k.max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CostBreakdown {
    pub energy_kwh: f64,
    /// Sum of squared out-of-deadband deviations (K²)
    pub comfort_penalty: f64,
    pub total: f64,
}

/// Cost of a simulated schedule.
///
/// Each slot's predicted end temperature is scored against the comfort
/// reference in force at the slot's start.
pub fn evaluate(
    simulated: &[SimulatedSlot],
    slots: &[ForecastSlot],
    comfort: &ComfortProfile,
    weights: &CostWeights,
) -> CostBreakdown {
    let mut energy_kwh = 0.0;
    let mut comfort_penalty = 0.0;
    for (sim, slot) in simulated.iter().zip(slots) {
        energy_kwh += sim.energy_kwh;
        let excess = ((sim.indoor_temp - comfort.reference(slot.start)).abs() - weights.deadband).max(0.0);
        comfort_penalty += excess * excess;
    }
    CostBreakdown {
        energy_kwh,
        comfort_penalty,
        total: weights.energy_weight * energy_kwh + weights.comfort_weight * comfort_penalty,
    }
}

/// Number of modulation changes across the schedule, counting the step
/// from the currently running modulation into the first slot.
pub fn modulation_changes(current: f64, modulations: &[f64]) -> usize {
    let mut prev = current;
    modulations
        .iter()
        .filter(|&&m| {
            let changed = (m - prev).abs() > CHANGE_THRESHOLD_PCT;
            prev = m;
            changed
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Forecast, WeatherPoint};
    use chrono::{Duration, TimeZone, Utc};

    fn make_slots(n: usize) -> Vec<ForecastSlot> {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
        let points = (0..n)
            .map(|i| WeatherPoint::calm(start + Duration::hours(i as i64), 5.0))
            .collect();
        Forecast::new(points).unwrap().slots_from(start, 48)
    }

    fn sim(indoor_temp: f64, energy_kwh: f64) -> SimulatedSlot {
        SimulatedSlot {
            indoor_temp,
            energy_kwh,
            heat_kwh: energy_kwh * 3.0,
            low_confidence: false,
        }
    }

    #[test]
    fn test_deadband_is_free() {
        let comfort = ComfortProfile::new(21.0, 0.0, 22, 6, 0);
        let weights = CostWeights {
            energy_weight: 1.0,
            comfort_weight: 10.0,
            deadband: 0.5,
        };
        let cost = evaluate(&[sim(21.4, 1.0), sim(20.6, 1.0)], &make_slots(2), &comfort, &weights);
        assert_eq!(cost.comfort_penalty, 0.0);
        assert!((cost.total - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_penalty_is_squared_excess() {
        let comfort = ComfortProfile::new(21.0, 0.0, 22, 6, 0);
        let weights = CostWeights {
            energy_weight: 0.0,
            comfort_weight: 1.0,
            deadband: 0.5,
        };
        let cost = evaluate(&[sim(19.5, 0.0)], &make_slots(1), &comfort, &weights);
        assert!((cost.comfort_penalty - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_change_count_includes_first_step() {
        assert_eq!(modulation_changes(30.0, &[30.0, 30.2, 30.2]), 0);
        assert_eq!(modulation_changes(0.0, &[30.0, 30.0, 0.0]), 2);
    }
}
