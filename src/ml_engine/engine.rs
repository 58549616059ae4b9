//! Learning Engine - thermal parameter estimation from operating history
//!
//! Pipeline:
//! 1. Quality filtering (finite values, plausible ranges, retention window)
//! 2. Minimum-sample gate: below `min_samples` the prior is published again
//!    with zero confidence
//! 3. Forest fit of the indoor heating rate on the oldest records, scored
//!    on the most recent `holdout_fraction`
//! 4. Sensitivity analysis: forest slopes are mapped back onto thermal lag,
//!    envelope loss, solar gain and wind factor
//! 5. Optional second forest on measured power for the COP curve
//! 6. Confidence-weighted blend into the previous parameters, clamped to
//!    physical bounds, published as a new `LearningState` version
//!
//! Readers call `snapshot()` and get a complete `Arc<LearningState>`; a
//! retrain never mutates a published state. There is a single writer (the
//! retrain task), so load-then-store publication cannot lose a version.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use statrs::statistics::Statistics;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::features::{TrainingSet, FEATURE_NAMES, MODULATION, OUTDOOR, PRIOR_INDOOR, SOLAR, WIND};
use super::forest::{ForestParams, RegressionForest};
use super::quality_filter::DataQualityFilter;
use super::sensitivity::{all_slopes, feature_ranges, operating_points, FeatureRange};
use crate::config::{defaults, LearningConfig};
use crate::thermal_model::PlantConstants;
use crate::types::{bounds, CopCurve, CopPoint, LearningState, ObservationRecord, ThermalParameters};

/// COP buckets this far outside the observed outdoor range are not refitted (K).
const COP_BUCKET_MARGIN_K: f64 = 2.5;

/// Predicted power below this is too small to divide by (kW).
const MIN_PREDICTED_POWER_KW: f64 = 0.05;

/// Mean heating plus solar contribution needed to read the wind factor (K).
const MIN_GAIN_FOR_WIND_K: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LearningError {
    #[error("insufficient history: {valid} usable records, {required} required")]
    InsufficientHistory { valid: usize, required: usize },
    #[error("model fit failed: {0}")]
    ModelFit(String),
}

/// What a retrain attempt did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetrainOutcome {
    Updated {
        version: u64,
        confidence: f64,
        holdout_mae: f64,
        samples: usize,
    },
    InsufficientHistory {
        valid: usize,
        required: usize,
    },
    ModelFitFailure {
        reason: String,
    },
}

impl RetrainOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, RetrainOutcome::Updated { .. })
    }
}

impl From<LearningError> for RetrainOutcome {
    fn from(err: LearningError) -> Self {
        match err {
            LearningError::InsufficientHistory { valid, required } => {
                RetrainOutcome::InsufficientHistory { valid, required }
            }
            LearningError::ModelFit(reason) => RetrainOutcome::ModelFitFailure { reason },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrainReport {
    pub outcome: RetrainOutcome,
    /// The state in force after the attempt
    pub state: Arc<LearningState>,
    /// Records dropped by the quality filter
    pub rejected_records: usize,
    /// Whether `state` is a newly published version
    pub published: bool,
}

/// Unblended physical values read off the forest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedParameters {
    pub thermal_lag_hours: f64,
    /// Mean envelope loss multiplier over the training set
    pub loss_factor: f64,
    pub solar_gain_factor: f64,
    pub wind_factor: f64,
}

#[derive(Debug)]
struct FittedModel {
    params: ThermalParameters,
    derived: DerivedParameters,
    confidence: f64,
    holdout_mae: f64,
}

pub struct LearningEngine {
    config: LearningConfig,
    plant: PlantConstants,
    prior: ThermalParameters,
    state: ArcSwap<LearningState>,
}

impl LearningEngine {
    /// Engine starting from the given prior with zero confidence.
    pub fn new(config: LearningConfig, plant: PlantConstants, prior: ThermalParameters) -> Self {
        let prior = prior.clamped();
        Self {
            config,
            plant,
            state: ArcSwap::from_pointee(LearningState::prior(prior.clone())),
            prior,
        }
    }

    /// Parameters used whenever history is too short to learn from.
    pub fn prior(&self) -> &ThermalParameters {
        &self.prior
    }

    /// Current state. Never blocks, never observes a partial update.
    pub fn snapshot(&self) -> Arc<LearningState> {
        self.state.load_full()
    }

    pub fn version(&self) -> u64 {
        self.state.load().version
    }

    /// Publish a previously persisted state, e.g. at startup.
    pub fn restore(&self, mut state: LearningState) {
        state.params = state.params.clamped();
        info!(
            version = state.version,
            samples = state.sample_count,
            confidence = state.confidence_score,
            "Restored learning state"
        );
        self.state.store(Arc::new(state));
    }

    fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.config.n_trees,
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            seed: self.config.seed,
        }
    }

    /// Retrain from a history snapshot.
    ///
    /// A successful fit publishes a new version. Too little usable history
    /// falls back to the prior with zero confidence, published as a new
    /// version unless the prior is already in force. A failed fit keeps the
    /// current state.
    pub fn retrain(&self, history: &[ObservationRecord], now: DateTime<Utc>) -> RetrainReport {
        let filtered = DataQualityFilter::filter(history, now, self.config.max_record_age_days);
        if let Some(reason) = filtered.primary_rejection {
            debug!(
                rejected = filtered.rejected,
                primary = %reason,
                "Quality filter dropped records"
            );
        }

        let current = self.snapshot();
        let valid = filtered.valid.len();
        let required = self.config.min_samples;

        let result = if valid < required {
            Err(LearningError::InsufficientHistory { valid, required })
        } else {
            self.fit(&filtered.valid, &current.params)
        };

        match result {
            Ok(fitted) => {
                let next = Arc::new(LearningState {
                    version: current.version + 1,
                    params: fitted.params,
                    sample_count: valid,
                    last_trained_at: Some(now),
                    confidence_score: fitted.confidence,
                    holdout_mae: Some(fitted.holdout_mae),
                });
                self.state.store(Arc::clone(&next));

                debug!(derived = ?fitted.derived, "Raw derived parameters");
                info!(
                    version = next.version,
                    samples = valid,
                    confidence = fitted.confidence,
                    holdout_mae = fitted.holdout_mae,
                    thermal_lag_hours = next.params.thermal_lag_hours,
                    solar_gain_factor = next.params.solar_gain_factor,
                    wind_factor = next.params.wind_factor,
                    "Learning state updated"
                );

                RetrainReport {
                    outcome: RetrainOutcome::Updated {
                        version: next.version,
                        confidence: fitted.confidence,
                        holdout_mae: fitted.holdout_mae,
                        samples: valid,
                    },
                    state: next,
                    rejected_records: filtered.rejected,
                    published: true,
                }
            }
            Err(LearningError::InsufficientHistory { valid, required }) => {
                info!(valid, required, "Not enough history to retrain yet");
                let (state, published) = self.fall_back_to_prior(&current);
                RetrainReport {
                    outcome: RetrainOutcome::InsufficientHistory { valid, required },
                    state,
                    rejected_records: filtered.rejected,
                    published,
                }
            }
            Err(LearningError::ModelFit(reason)) => {
                warn!(
                    reason = %reason,
                    version = current.version,
                    "Retrain skipped, keeping current parameters"
                );
                RetrainReport {
                    outcome: RetrainOutcome::ModelFitFailure { reason },
                    state: current,
                    rejected_records: filtered.rejected,
                    published: false,
                }
            }
        }
    }

    /// Publish the prior unless it is already the state in force.
    fn fall_back_to_prior(&self, current: &Arc<LearningState>) -> (Arc<LearningState>, bool) {
        if current.is_prior() && current.params == self.prior {
            return (Arc::clone(current), false);
        }
        let next = Arc::new(LearningState {
            version: current.version + 1,
            ..LearningState::prior(self.prior.clone())
        });
        warn!(
            previous_version = current.version,
            version = next.version,
            "Learned parameters dropped, reverting to prior"
        );
        self.state.store(Arc::clone(&next));
        (next, true)
    }

    fn fit(
        &self,
        records: &[&ObservationRecord],
        previous: &ThermalParameters,
    ) -> Result<FittedModel, LearningError> {
        let set = TrainingSet::build(records.iter().copied());
        let n = set.len();
        if n < 2 {
            return Err(LearningError::InsufficientHistory { valid: n, required: 2 });
        }

        let ranges = feature_ranges(&set);
        for feature in [OUTDOOR, PRIOR_INDOOR, MODULATION] {
            if !ranges[feature].has_spread() {
                return Err(LearningError::ModelFit(format!(
                    "no spread in {}",
                    FEATURE_NAMES[feature]
                )));
            }
        }

        // Records arrive oldest first, so the tail is the most recent.
        let holdout = ((n as f64 * self.config.holdout_fraction).ceil() as usize).clamp(1, n - 1);
        let split = n - holdout;

        let forest = RegressionForest::fit(&set.rows[..split], &set.rates[..split], &self.forest_params())
            .map_err(|e| LearningError::ModelFit(e.to_string()))?;

        let errors: Vec<f64> = (split..n)
            .map(|i| {
                let predicted = set.prior_indoor[i] + forest.predict(&set.rows[i]) * set.intervals[i];
                (predicted - set.actual_indoor[i]).abs()
            })
            .collect();
        let holdout_mae = errors.iter().mean();
        if !holdout_mae.is_finite() {
            return Err(LearningError::ModelFit("holdout error is not finite".to_string()));
        }

        let confidence = (n as f64 / (3.0 * self.config.min_samples as f64)).min(1.0)
            * (1.0 - holdout_mae / defaults::CONFIDENCE_MAE_SCALE_K).max(0.0);

        let points = operating_points(&set.rows[..split], defaults::SENSITIVITY_PROBE_POINTS);
        let slopes = all_slopes(&forest, &points, &ranges);
        let derived = self.derive(&slopes, &ranges, previous)?;
        let fitted_cop = self.fit_cop(&set, &ranges);

        let alpha = (self.config.learning_rate * 10.0).clamp(0.01, 1.0) * confidence;
        let blend = |old: f64, new: f64| old + alpha * (new - old);

        let cop_curve = CopCurve::new(
            previous
                .cop_curve
                .points()
                .iter()
                .map(|p| {
                    let cop = fitted_cop
                        .as_ref()
                        .and_then(|f| f.cop_at(p.outdoor_temp))
                        .map_or(p.cop, |c| blend(p.cop, c.clamp(bounds::COP_MIN, bounds::COP_MAX)));
                    CopPoint { outdoor_temp: p.outdoor_temp, cop }
                })
                .collect(),
        );

        let params = ThermalParameters {
            thermal_lag_hours: blend(
                previous.thermal_lag_hours,
                derived
                    .thermal_lag_hours
                    .clamp(bounds::THERMAL_LAG_MIN_HOURS, bounds::THERMAL_LAG_MAX_HOURS),
            ),
            solar_gain_factor: blend(
                previous.solar_gain_factor,
                derived.solar_gain_factor.clamp(bounds::SOLAR_GAIN_MIN, bounds::SOLAR_GAIN_MAX),
            ),
            wind_factor: blend(
                previous.wind_factor,
                derived.wind_factor.clamp(bounds::WIND_FACTOR_MIN, bounds::WIND_FACTOR_MAX),
            ),
            building_thermal_mass: previous.building_thermal_mass,
            cop_curve,
        }
        .clamped();

        Ok(FittedModel { params, derived, confidence, holdout_mae })
    }

    /// Map forest slopes onto the physical parameters of the first-order model.
    ///
    /// With `rate = (T_out + (H + S) / G - T) / tau`:
    /// d/dT_out = 1/tau, d/dT = -1/tau, d/dm = cap / (100 G tau),
    /// d/dI = s / (ref G tau), d/dv = -w (H + S) / (G² tau).
    fn derive(
        &self,
        slopes: &[Option<f64>; 5],
        ranges: &[FeatureRange; 5],
        previous: &ThermalParameters,
    ) -> Result<DerivedParameters, LearningError> {
        let relaxation = match (slopes[OUTDOOR], slopes[PRIOR_INDOOR]) {
            (Some(a), Some(b)) => 0.5 * (a - b),
            (Some(a), None) => a,
            (None, Some(b)) => -b,
            (None, None) => f64::NAN,
        };
        if !(relaxation.is_finite() && relaxation > 0.0) {
            return Err(LearningError::ModelFit(format!(
                "no relaxation toward outdoor temperature (1/tau = {relaxation:.4})"
            )));
        }
        let tau = 1.0 / relaxation;

        let mean_wind = ranges[WIND].mean;
        let fallback_loss = 1.0 + previous.wind_factor * mean_wind.max(0.0);
        let loss_factor = slopes[MODULATION]
            .filter(|s| *s > 0.0)
            .map(|s| self.plant.heating_capacity_k / (100.0 * tau * s))
            .filter(|g| g.is_finite())
            .map_or(fallback_loss, |g| g.max(1.0));

        let solar_gain_factor = slopes[SOLAR]
            .map(|s| s * self.plant.solar_reference_w_m2 * loss_factor * tau)
            .unwrap_or(previous.solar_gain_factor);

        let mean_heat = ranges[MODULATION].mean / 100.0 * self.plant.heating_capacity_k;
        let mean_solar =
            solar_gain_factor.max(0.0) * ranges[SOLAR].mean.max(0.0) / self.plant.solar_reference_w_m2;
        let wind_factor = match slopes[WIND] {
            Some(s) if mean_heat + mean_solar > MIN_GAIN_FOR_WIND_K => {
                -s * loss_factor * loss_factor * tau / (mean_heat + mean_solar)
            }
            _ => previous.wind_factor,
        };

        let derived = DerivedParameters {
            thermal_lag_hours: tau,
            loss_factor,
            solar_gain_factor,
            wind_factor,
        };
        if [tau, loss_factor, solar_gain_factor, wind_factor]
            .iter()
            .all(|v| v.is_finite())
        {
            Ok(derived)
        } else {
            Err(LearningError::ModelFit(format!("non-finite derived parameters: {derived:?}")))
        }
    }

    /// COP per bucket from a power forest, over the observed outdoor range.
    ///
    /// `None` when there are too few running samples with measured power.
    fn fit_cop(&self, set: &TrainingSet, ranges: &[FeatureRange; 5]) -> Option<FittedCop> {
        if set.power_rows.len() < (self.config.min_samples / 2).max(1) {
            return None;
        }
        let forest = match RegressionForest::fit(&set.power_rows, &set.power_targets, &self.forest_params()) {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "Power model fit failed, keeping COP curve");
                return None;
            }
        };

        let outdoor = FeatureRange::from_values(set.power_rows.iter().map(|x| x[OUTDOOR]).collect());
        let reference_modulation = set.power_rows.iter().map(|x| x[MODULATION]).mean();
        let heat_kw = reference_modulation / 100.0 * self.plant.rated_output_kw;

        Some(FittedCop {
            forest,
            min_outdoor: outdoor.min - COP_BUCKET_MARGIN_K,
            max_outdoor: outdoor.max + COP_BUCKET_MARGIN_K,
            reference_point: [
                0.0,
                ranges[WIND].mean,
                ranges[SOLAR].mean,
                reference_modulation,
                ranges[PRIOR_INDOOR].mean,
            ],
            heat_kw,
        })
    }
}

struct FittedCop {
    forest: RegressionForest,
    min_outdoor: f64,
    max_outdoor: f64,
    reference_point: [f64; 5],
    heat_kw: f64,
}

impl FittedCop {
    fn cop_at(&self, outdoor_temp: f64) -> Option<f64> {
        if !(self.min_outdoor..=self.max_outdoor).contains(&outdoor_temp) {
            return None;
        }
        let mut x = self.reference_point;
        x[OUTDOOR] = outdoor_temp;
        let power = self.forest.predict(&x);
        (power > MIN_PREDICTED_POWER_KW)
            .then(|| self.heat_kw / power)
            .filter(|c| c.is_finite())
    }
}
