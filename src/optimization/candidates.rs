//! Candidate setpoint plans
//!
//! Each candidate is a setpoint per forecast slot plus the reason for it.
//! Candidates are produced in a fixed order (maintain, pre-heat, setback);
//! that order is the final tie-break when costs and change counts match.

use chrono::{DateTime, Utc};

use super::comfort::ComfortProfile;
use crate::config::defaults;
use crate::thermal_model::ThermalModel;
use crate::types::{CandidateKind, ForecastSlot, Rationale, ThermalParameters};

/// A candidate before tracking and constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePlan {
    pub kind: CandidateKind,
    pub setpoints: Vec<f64>,
    pub rationales: Vec<Rationale>,
}

impl CandidatePlan {
    fn flat(kind: CandidateKind, target: f64, n: usize) -> Self {
        Self {
            kind,
            setpoints: vec![target; n],
            rationales: vec![Rationale::Normal; n],
        }
    }
}

/// Everything a plan is computed from.
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs<'a> {
    pub now: DateTime<Utc>,
    pub indoor_temp: f64,
    pub slots: &'a [ForecastSlot],
    pub params: &'a ThermalParameters,
    /// Modulation currently in force (last committed)
    pub current_modulation: f64,
    /// When the compressor last started, if it is running
    pub running_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateGenerator {
    comfort: ComfortProfile,
    deadband: f64,
    preheat_max_boost: f64,
}

impl CandidateGenerator {
    pub fn new(comfort: ComfortProfile, deadband: f64, preheat_max_boost: f64) -> Self {
        Self {
            comfort,
            deadband,
            preheat_max_boost,
        }
    }

    pub fn comfort(&self) -> &ComfortProfile {
        &self.comfort
    }

    /// Maintain always comes first; the others only when they differ from it.
    pub fn generate(&self, model: &ThermalModel, inputs: &PlanInputs<'_>) -> Vec<CandidatePlan> {
        let n = inputs.slots.len();
        let mut plans = vec![CandidatePlan::flat(CandidateKind::Maintain, self.comfort.target, n)];
        if let Some(plan) = self.preheat(model, inputs) {
            plans.push(plan);
        }
        if let Some(plan) = self.setback(model, inputs) {
            plans.push(plan);
        }
        plans
    }

    /// Heat needed to hold the comfort reference in each slot, expressed as
    /// equilibrium rise (K) after passive solar gain.
    fn demand(&self, model: &ThermalModel, inputs: &PlanInputs<'_>) -> Vec<f64> {
        inputs
            .slots
            .iter()
            .map(|slot| {
                let w = &slot.weather;
                let reference = self.comfort.reference(slot.start);
                (reference - w.outdoor_temp) * ThermalModel::loss_factor(w, inputs.params)
                    - model.solar_gain_k(w, inputs.params)
            })
            .collect()
    }

    /// Boost ahead of the first slot whose demand rises sharply over now.
    fn preheat(&self, model: &ThermalModel, inputs: &PlanInputs<'_>) -> Option<CandidatePlan> {
        let n = inputs.slots.len();
        if n < 2 || self.preheat_max_boost <= 0.0 {
            return None;
        }
        let demand = self.demand(model, inputs);
        let (cold, rise) = demand
            .iter()
            .enumerate()
            .skip(1)
            .map(|(k, d)| (k, d - demand[0]))
            .find(|(_, rise)| *rise >= defaults::PREHEAT_DEMAND_RISE_K)?;

        let boost = (rise * defaults::PREHEAT_BOOST_PER_K).min(self.preheat_max_boost);
        let slot_hours = inputs.slots[0].duration_hours.max(f64::EPSILON);
        let lead = (inputs.params.thermal_lag_hours / slot_hours).ceil().max(1.0) as usize;

        let mut plan = CandidatePlan::flat(CandidateKind::PreHeat, self.comfort.target, n);
        for k in cold.saturating_sub(lead)..cold {
            plan.setpoints[k] = self.comfort.target + boost;
            plan.rationales[k] = Rationale::PreHeat;
        }
        Some(plan)
    }

    /// Night setback plus a deadband-deep setback in mild or sunny slots.
    fn setback(&self, model: &ThermalModel, inputs: &PlanInputs<'_>) -> Option<CandidatePlan> {
        let n = inputs.slots.len();
        let mut plan = CandidatePlan::flat(CandidateKind::Setback, self.comfort.target, n);
        let mut any = false;

        for (k, slot) in inputs.slots.iter().enumerate() {
            let w = &slot.weather;
            let night = self.comfort.night_setback > 0.0 && self.comfort.is_night(slot.start);
            let mild = model.solar_gain_k(w, inputs.params) >= defaults::MILD_SOLAR_GAIN_K
                || w.outdoor_temp >= self.comfort.target - defaults::MILD_OUTDOOR_MARGIN_K;

            let setpoint = if night {
                Some(self.comfort.target - self.comfort.night_setback)
            } else if mild && self.deadband > 0.0 {
                Some(self.comfort.target - self.deadband)
            } else {
                None
            };
            if let Some(sp) = setpoint {
                plan.setpoints[k] = sp;
                plan.rationales[k] = Rationale::Setback;
                any = true;
            }
        }
        any.then_some(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BuildingMass, CopCurve, Forecast, WeatherPoint};
    use chrono::{Duration, TimeZone};

    fn make_params() -> ThermalParameters {
        ThermalParameters {
            thermal_lag_hours: 3.0,
            solar_gain_factor: 0.3,
            wind_factor: 0.0,
            building_thermal_mass: BuildingMass::Medium,
            cop_curve: CopCurve::constant(3.0),
        }
    }

    fn make_slots(temps: &[f64], irradiance: &[f64], start_hour: u32) -> Vec<ForecastSlot> {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, start_hour, 0, 0).unwrap();
        let points = temps
            .iter()
            .zip(irradiance)
            .enumerate()
            .map(|(i, (&t, &irr))| WeatherPoint {
                solar_irradiance: Some(irr),
                ..WeatherPoint::calm(start + Duration::hours(i as i64), t)
            })
            .collect();
        Forecast::new(points).unwrap().slots_from(start, 48)
    }

    fn make_inputs<'a>(slots: &'a [ForecastSlot], params: &'a ThermalParameters) -> PlanInputs<'a> {
        PlanInputs {
            now: slots[0].start,
            indoor_temp: 21.0,
            slots,
            params,
            current_modulation: 30.0,
            running_since: None,
        }
    }

    #[test]
    fn test_constant_weather_only_maintain() {
        let gen = CandidateGenerator::new(ComfortProfile::new(21.0, 0.0, 22, 6, 0), 0.5, 2.0);
        let params = make_params();
        let slots = make_slots(&[5.0; 8], &[0.0; 8], 8);
        let plans = gen.generate(&ThermalModel::default(), &make_inputs(&slots, &params));
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, CandidateKind::Maintain);
        assert!(plans[0].rationales.iter().all(|r| *r == Rationale::Normal));
    }

    #[test]
    fn test_preheat_boosts_before_cold_window() {
        let gen = CandidateGenerator::new(ComfortProfile::new(21.0, 0.0, 22, 6, 0), 0.5, 2.0);
        let params = make_params();
        let temps = [5.0, 5.0, 5.0, 5.0, 5.0, 5.0, -5.0, -5.0];
        let slots = make_slots(&temps, &[0.0; 8], 8);
        let plans = gen.generate(&ThermalModel::default(), &make_inputs(&slots, &params));

        let preheat = plans.iter().find(|p| p.kind == CandidateKind::PreHeat).unwrap();
        // lag 3 h over 1 h slots: slots 3..6 are boosted by min(2, 10 * 0.2)
        assert_eq!(&preheat.rationales[3..6], &[Rationale::PreHeat; 3]);
        assert_eq!(preheat.rationales[2], Rationale::Normal);
        assert_eq!(preheat.rationales[6], Rationale::Normal);
        assert!((preheat.setpoints[4] - 23.0).abs() < 1e-12);
    }

    #[test]
    fn test_setback_in_sunny_window_and_night() {
        let gen = CandidateGenerator::new(ComfortProfile::new(21.0, 2.0, 22, 6, 0), 0.5, 2.0);
        let params = make_params();
        let irradiance = [0.0, 0.0, 600.0, 600.0, 0.0, 0.0];
        // 18:00 .. 23:00
        let slots = make_slots(&[5.0; 6], &irradiance, 18);
        let plans = gen.generate(&ThermalModel::default(), &make_inputs(&slots, &params));

        let setback = plans.iter().find(|p| p.kind == CandidateKind::Setback).unwrap();
        assert_eq!(setback.rationales[0], Rationale::Normal);
        assert_eq!(setback.rationales[2], Rationale::Setback);
        assert!((setback.setpoints[2] - 20.5).abs() < 1e-12);
        assert_eq!(setback.rationales[5], Rationale::Setback);
        assert!((setback.setpoints[5] - 19.0).abs() < 1e-12);
    }
}
