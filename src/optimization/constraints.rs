//! Hard constraints applied to every candidate
//!
//! - modulation cap: tracked modulations are clamped to [0, max_modulation]
//! - minimum runtime: once the compressor starts it may not go to zero for
//!   `min_runtime`; such slots run at `min_running_modulation` instead
//! - setback windows: at most `max_per_night` setback runs per night

use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::candidates::{CandidatePlan, PlanInputs};
use super::comfort::ComfortProfile;
use crate::config::{defaults, ControlConfig};
use crate::thermal_model::ThermalModel;
use crate::types::Rationale;

/// Modulation limits from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModulationLimits {
    pub max_modulation: f64,
    pub min_running_modulation: f64,
    pub min_runtime: Duration,
}

impl From<&ControlConfig> for ModulationLimits {
    fn from(cfg: &ControlConfig) -> Self {
        Self {
            max_modulation: cfg.max_modulation,
            min_running_modulation: cfg.min_running_modulation.min(cfg.max_modulation),
            min_runtime: cfg.min_runtime(),
        }
    }
}

/// Per-slot modulations after tracking and constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSchedule {
    pub modulations: Vec<f64>,
    /// Slot was raised from off by the minimum-runtime rule
    pub forced: Vec<bool>,
}

pub fn is_off(modulation: f64) -> bool {
    modulation <= defaults::OFF_THRESHOLD_PCT
}

/// Keep only the first `max_per_night` setback runs that touch each night.
///
/// Runs that never touch the night window are not limited. Dropped runs
/// return to the daytime target with a normal rationale.
pub fn limit_setback_windows(
    plan: &mut CandidatePlan,
    start_times: &[DateTime<Utc>],
    comfort: &ComfortProfile,
    max_per_night: u32,
) {
    let n = plan.rationales.len().min(start_times.len());
    let mut seen: Vec<(NaiveDate, u32)> = Vec::new();
    let mut k = 0;

    while k < n {
        if plan.rationales[k] != Rationale::Setback {
            k += 1;
            continue;
        }
        let run_start = k;
        while k < n && plan.rationales[k] == Rationale::Setback {
            k += 1;
        }

        let Some(night) = (run_start..k)
            .find(|&i| comfort.is_night(start_times[i]))
            .map(|i| comfort.night_key(start_times[i]))
        else {
            continue;
        };

        let count = match seen.iter_mut().find(|(key, _)| *key == night) {
            Some((_, c)) => {
                *c += 1;
                *c
            }
            None => {
                seen.push((night, 1));
                1
            }
        };
        if count > max_per_night {
            for i in run_start..k {
                plan.setpoints[i] = comfort.target;
                plan.rationales[i] = Rationale::Normal;
            }
        }
    }
}

/// Modulation per slot that steers the house onto the plan's setpoints,
/// subject to the cap and the minimum-runtime rule.
///
/// Slots are tracked in order so each one starts from the temperature the
/// previous slot actually reaches under its constrained modulation. The
/// first slot is expected to start at `inputs.now` (see `align_to_now`).
pub fn track_schedule(
    model: &ThermalModel,
    inputs: &PlanInputs<'_>,
    setpoints: &[f64],
    limits: &ModulationLimits,
) -> TrackedSchedule {
    let n = inputs.slots.len().min(setpoints.len());
    let mut modulations = Vec::with_capacity(n);
    let mut forced = Vec::with_capacity(n);

    let mut indoor = inputs.indoor_temp;
    let mut running_since = if is_off(inputs.current_modulation) {
        None
    } else {
        inputs.running_since
    };

    for (slot, &setpoint) in inputs.slots.iter().zip(setpoints) {
        let slot_start = slot.start;
        let dt = slot.duration_hours;

        let wanted = model
            .required_modulation(indoor, &slot.weather, dt, inputs.params, setpoint)
            .clamp(0.0, limits.max_modulation);

        let (m, was_forced) = if is_off(wanted) {
            match running_since {
                Some(since) if slot_start < since + limits.min_runtime => {
                    (limits.min_running_modulation, true)
                }
                _ => {
                    running_since = None;
                    (0.0, false)
                }
            }
        } else {
            if running_since.is_none() {
                running_since = Some(slot_start);
            }
            (wanted, false)
        };

        indoor = model.step(indoor, &slot.weather, dt, inputs.params, m).indoor_temp;
        modulations.push(m);
        forced.push(was_forced);
    }

    TrackedSchedule { modulations, forced }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BuildingMass, CandidateKind, CopCurve, Forecast, ForecastSlot, ThermalParameters, WeatherPoint};
    use chrono::TimeZone;

    fn make_params() -> ThermalParameters {
        ThermalParameters {
            thermal_lag_hours: 4.0,
            solar_gain_factor: 0.3,
            wind_factor: 0.0,
            building_thermal_mass: BuildingMass::Medium,
            cop_curve: CopCurve::constant(3.0),
        }
    }

    fn make_slots(n: usize, outdoor: f64, start: DateTime<Utc>) -> Vec<ForecastSlot> {
        let points = (0..n)
            .map(|i| WeatherPoint::calm(start + Duration::hours(i as i64), outdoor))
            .collect();
        Forecast::new(points).unwrap().slots_from(start, 48)
    }

    fn make_limits() -> ModulationLimits {
        ModulationLimits {
            max_modulation: 60.0,
            min_running_modulation: 20.0,
            min_runtime: Duration::minutes(120),
        }
    }

    #[test]
    fn test_cap_applies() {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
        let slots = make_slots(4, -15.0, start);
        let params = make_params();
        let inputs = PlanInputs {
            now: start,
            indoor_temp: 18.0,
            slots: &slots,
            params: &params,
            current_modulation: 0.0,
            running_since: None,
        };
        let tracked = track_schedule(&ThermalModel::default(), &inputs, &[21.0; 4], &make_limits());
        assert!(tracked.modulations.iter().all(|m| *m <= 60.0 && *m > 0.0));
    }

    #[test]
    fn test_min_runtime_forces_running_slots() {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
        // Mild enough that tracking would switch off immediately
        let slots = make_slots(4, 22.0, start);
        let params = make_params();
        let inputs = PlanInputs {
            now: start,
            indoor_temp: 21.0,
            slots: &slots,
            params: &params,
            current_modulation: 40.0,
            running_since: Some(start - Duration::minutes(30)),
        };
        let tracked = track_schedule(&ThermalModel::default(), &inputs, &[21.0; 4], &make_limits());
        // started 30 min ago, 120 min minimum: slots at +0 h and +1 h are forced
        assert_eq!(tracked.forced, vec![true, true, false, false]);
        assert_eq!(tracked.modulations[0], 20.0);
        assert_eq!(tracked.modulations[2], 0.0);
    }

    #[test]
    fn test_one_setback_window_per_night() {
        let comfort = ComfortProfile::new(21.0, 2.0, 22, 6, 0);
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 21, 0, 0).unwrap();
        let times: Vec<_> = (0..8).map(|i| start + Duration::hours(i)).collect();
        let s = Rationale::Setback;
        let n = Rationale::Normal;
        let mut plan = CandidatePlan {
            kind: CandidateKind::Setback,
            setpoints: vec![19.0; 8],
            // 21:00 n, 22-23 setback, 00:00 n, 01-02 setback, 03-04 n
            rationales: vec![n, s, s, n, s, s, n, n],
        };
        limit_setback_windows(&mut plan, &times, &comfort, 1);
        assert_eq!(plan.rationales, vec![n, s, s, n, n, n, n, n]);
        assert_eq!(plan.setpoints[4], 21.0);
    }
}
