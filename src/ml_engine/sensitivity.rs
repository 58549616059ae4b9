//! Sensitivity analysis of a fitted forest
//!
//! The forest is a black box over five features. The physical parameters
//! are recovered from its partial slopes: for each feature, the prediction
//! is taken at the 10th and 90th percentile of that feature while every
//! other feature stays at a real operating point, and the finite
//! difference is averaged over a strided sample of such points.

use statrs::statistics::{Data, OrderStatistics, Statistics};

use super::features::TrainingSet;
use super::forest::{FeatureVector, RegressionForest, NUM_FEATURES};

/// Percentile spread below which a feature counts as constant.
pub const MIN_SPREAD: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRange {
    pub p10: f64,
    pub p90: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl FeatureRange {
    pub fn from_values(values: Vec<f64>) -> Self {
        let mean = values.iter().mean();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut data = Data::new(values);
        Self {
            p10: data.quantile(0.1),
            p90: data.quantile(0.9),
            min,
            max,
            mean,
        }
    }

    pub fn spread(&self) -> f64 {
        self.p90 - self.p10
    }

    pub fn has_spread(&self) -> bool {
        self.spread().is_finite() && self.spread() > MIN_SPREAD
    }
}

/// Ranges of every feature over the training rows.
pub fn feature_ranges(set: &TrainingSet) -> [FeatureRange; NUM_FEATURES] {
    std::array::from_fn(|f| FeatureRange::from_values(set.column(f)))
}

/// Up to `max_points` rows, evenly strided through the set.
pub fn operating_points(rows: &[FeatureVector], max_points: usize) -> Vec<FeatureVector> {
    if rows.is_empty() || max_points == 0 {
        return Vec::new();
    }
    let step = rows.len().div_ceil(max_points).max(1);
    rows.iter().step_by(step).copied().collect()
}

/// Average slope of the forest along `feature` between its p10 and p90.
///
/// `None` when the feature has no spread.
pub fn average_slope(
    forest: &RegressionForest,
    points: &[FeatureVector],
    feature: usize,
    range: &FeatureRange,
) -> Option<f64> {
    if !range.has_spread() || points.is_empty() {
        return None;
    }
    let slopes: Vec<f64> = points
        .iter()
        .map(|point| {
            let mut lo = *point;
            let mut hi = *point;
            lo[feature] = range.p10;
            hi[feature] = range.p90;
            (forest.predict(&hi) - forest.predict(&lo)) / range.spread()
        })
        .collect();
    let mean = slopes.iter().mean();
    mean.is_finite().then_some(mean)
}

/// Slope along every feature, `None` for constant features.
pub fn all_slopes(
    forest: &RegressionForest,
    points: &[FeatureVector],
    ranges: &[FeatureRange; NUM_FEATURES],
) -> [Option<f64>; NUM_FEATURES] {
    std::array::from_fn(|f| average_slope(forest, points, f, &ranges[f]))
}
