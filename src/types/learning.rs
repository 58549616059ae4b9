//! Learning state published by the learning engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ThermalParameters;

/// Versioned, immutable snapshot of what the engine currently believes.
///
/// Readers hold an `Arc<LearningState>`; a retrain publishes a new value
/// rather than touching the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    /// Monotonic, bumped on every publication (0 = untouched prior)
    pub version: u64,
    pub params: ThermalParameters,
    /// Number of quality-filtered records the parameters were fitted on
    pub sample_count: usize,
    pub last_trained_at: Option<DateTime<Utc>>,
    /// Self-assessed reliability of `params` (0-1)
    pub confidence_score: f64,
    /// Mean absolute next-step temperature error on held-out history (K)
    #[serde(default)]
    pub holdout_mae: Option<f64>,
}

impl LearningState {
    /// Initial state: the prior parameters with zero confidence.
    pub fn prior(params: ThermalParameters) -> Self {
        Self {
            version: 0,
            params,
            sample_count: 0,
            last_trained_at: None,
            confidence_score: 0.0,
            holdout_mae: None,
        }
    }

    pub fn is_prior(&self) -> bool {
        self.last_trained_at.is_none()
    }
}
