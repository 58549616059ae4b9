//! ScheduleOptimizer - candidate evaluation and selection
//!
//! For each candidate plan: limit setback windows, track the setpoints
//! under the modulation constraints, simulate the result and score it.
//! Selection takes the lowest cost; costs within `COST_TIE_EPSILON` go to
//! the plan with fewer modulation changes, then to generation order.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::candidates::{CandidateGenerator, CandidatePlan, PlanInputs};
use super::comfort::ComfortProfile;
use super::constraints::{limit_setback_windows, track_schedule, ModulationLimits};
use super::cost::{evaluate, modulation_changes, CostBreakdown, CostWeights};
use crate::config::SystemConfig;
use crate::thermal_model::ThermalModel;
use crate::types::weather::hours_between;
use crate::types::{CandidateKind, ForecastSlot, Rationale, SlotDecision};

/// Costs closer than this are treated as equal.
const COST_TIE_EPSILON: f64 = 1e-9;

/// A fully constrained, simulated and scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedCandidate {
    pub kind: CandidateKind,
    pub slots: Vec<SlotDecision>,
    pub cost: CostBreakdown,
    /// Modulation changes including the step from the running modulation
    pub changes: usize,
}

impl EvaluatedCandidate {
    pub fn modulations(&self) -> impl Iterator<Item = f64> + '_ {
        self.slots.iter().map(|s| s.modulation_pct)
    }
}

/// Clip the first slot so it starts at `now`.
///
/// A slot already fully elapsed never reaches here (`Forecast::slots_from`
/// drops it); a slot that started before `now` keeps only its remainder.
pub fn align_to_now(now: DateTime<Utc>, slots: &[ForecastSlot]) -> Vec<ForecastSlot> {
    let mut aligned = slots.to_vec();
    if let Some(first) = aligned.first_mut() {
        if first.start < now {
            let remaining = hours_between(now, first.end());
            if remaining > 0.0 {
                first.duration_hours = remaining;
                first.start = now;
            }
        }
    }
    aligned
}

#[derive(Debug, Clone)]
pub struct ScheduleOptimizer {
    model: ThermalModel,
    generator: CandidateGenerator,
    limits: ModulationLimits,
    weights: CostWeights,
    max_setback_windows_per_night: u32,
}

impl ScheduleOptimizer {
    pub fn new(model: ThermalModel, config: &SystemConfig) -> Self {
        let comfort = ComfortProfile::from(&config.house);
        let control = &config.control;
        Self {
            model,
            generator: CandidateGenerator::new(comfort, control.comfort_deadband_k, control.preheat_max_boost_k),
            limits: ModulationLimits::from(control),
            weights: CostWeights::from(control),
            max_setback_windows_per_night: control.max_setback_windows_per_night,
        }
    }

    pub fn model(&self) -> &ThermalModel {
        &self.model
    }

    pub fn comfort(&self) -> &ComfortProfile {
        self.generator.comfort()
    }

    /// Every candidate in generation order. `inputs.slots` should already be
    /// aligned to `inputs.now`.
    pub fn evaluate_all(&self, inputs: &PlanInputs<'_>) -> Vec<EvaluatedCandidate> {
        if inputs.slots.is_empty() {
            return Vec::new();
        }
        self.generator
            .generate(&self.model, inputs)
            .into_iter()
            .map(|plan| self.evaluate_plan(plan, inputs))
            .collect()
    }

    /// The selected candidate, or `None` with no slots to plan.
    pub fn optimize(&self, inputs: &PlanInputs<'_>) -> Option<EvaluatedCandidate> {
        let mut evaluated = self.evaluate_all(inputs);
        let best = select(&evaluated)?;
        Some(evaluated.swap_remove(best))
    }

    fn evaluate_plan(&self, mut plan: CandidatePlan, inputs: &PlanInputs<'_>) -> EvaluatedCandidate {
        let starts: Vec<DateTime<Utc>> = inputs.slots.iter().map(|s| s.start).collect();
        limit_setback_windows(&mut plan, &starts, self.comfort(), self.max_setback_windows_per_night);

        let tracked = track_schedule(&self.model, inputs, &plan.setpoints, &self.limits);
        let simulated = self
            .model
            .simulate(inputs.indoor_temp, inputs.slots, inputs.params, &tracked.modulations);
        let cost = evaluate(&simulated, inputs.slots, self.comfort(), &self.weights);
        let changes = modulation_changes(inputs.current_modulation, &tracked.modulations);

        let slots = inputs
            .slots
            .iter()
            .zip(&simulated)
            .enumerate()
            .map(|(k, (slot, sim))| SlotDecision {
                start: slot.start,
                duration_hours: slot.duration_hours,
                target_setpoint: plan.setpoints[k],
                modulation_pct: tracked.modulations[k],
                rationale: if tracked.forced[k] {
                    Rationale::ForcedMinimumRuntime
                } else {
                    plan.rationales[k]
                },
                predicted_indoor_temp: sim.indoor_temp,
                predicted_energy_kwh: sim.energy_kwh,
                low_confidence: sim.low_confidence,
            })
            .collect();

        EvaluatedCandidate {
            kind: plan.kind,
            slots,
            cost,
            changes,
        }
    }
}

/// Index of the winning candidate.
pub fn select(candidates: &[EvaluatedCandidate]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, c) in candidates.iter().enumerate() {
        let Some(b) = best else {
            best = Some(i);
            continue;
        };
        let incumbent = &candidates[b];
        let diff = c.cost.total - incumbent.cost.total;
        if diff < -COST_TIE_EPSILON || (diff.abs() <= COST_TIE_EPSILON && c.changes < incumbent.changes) {
            best = Some(i);
        }
    }
    best
}
