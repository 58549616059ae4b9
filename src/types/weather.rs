//! Weather types: WeatherPoint, Forecast, ForecastSlot
//!
//! A forecast is an immutable, strictly time-ordered sequence of points.
//! The constructor enforces ordering so downstream code can assume it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Slot length assumed for a single-point forecast or the final point.
const DEFAULT_SLOT_HOURS: f64 = 1.0;

/// One forecast sample for a point in time.
///
/// Optional fields are `None` when the upstream provider did not supply
/// them; the thermal model treats a missing irradiance or wind value as
/// zero contribution and flags the slot as low-confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherPoint {
    pub timestamp: DateTime<Utc>,
    /// Outdoor air temperature (°C)
    pub outdoor_temp: f64,
    /// Wind speed (m/s)
    #[serde(default)]
    pub wind_speed: Option<f64>,
    /// Global horizontal irradiance (W/m²)
    #[serde(default)]
    pub solar_irradiance: Option<f64>,
    /// Cloud cover (0-100 %)
    #[serde(default)]
    pub cloud_cover: Option<f64>,
    /// Relative humidity (0-100 %)
    #[serde(default)]
    pub humidity: Option<f64>,
}

impl WeatherPoint {
    /// Point with temperature only; wind and irradiance explicitly zero.
    pub fn calm(timestamp: DateTime<Utc>, outdoor_temp: f64) -> Self {
        Self {
            timestamp,
            outdoor_temp,
            wind_speed: Some(0.0),
            solar_irradiance: Some(0.0),
            cloud_cover: None,
            humidity: None,
        }
    }

    /// True when either input the model depends on is absent.
    pub fn has_missing_inputs(&self) -> bool {
        self.wind_speed.is_none() || self.solar_irradiance.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForecastError {
    #[error("forecast contains no points")]
    Empty,
    #[error("forecast timestamps not strictly ascending at index {index}")]
    NotAscending { index: usize },
    #[error("forecast point {index} has a non-finite outdoor temperature")]
    NonFinite { index: usize },
}

/// A validated forecast: non-empty, strictly ascending, no duplicates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    points: Vec<WeatherPoint>,
}

impl Forecast {
    pub fn new(points: Vec<WeatherPoint>) -> Result<Self, ForecastError> {
        if points.is_empty() {
            return Err(ForecastError::Empty);
        }
        for (index, p) in points.iter().enumerate() {
            if !p.outdoor_temp.is_finite() {
                return Err(ForecastError::NonFinite { index });
            }
            if index > 0 && p.timestamp <= points[index - 1].timestamp {
                return Err(ForecastError::NotAscending { index });
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[WeatherPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Convert to slots with durations, dropping slots that already ended
    /// before `now` and keeping at most `horizon_hours` worth of slots.
    ///
    /// Each slot lasts until the next point; the last slot reuses the
    /// previous spacing.
    pub fn slots_from(&self, now: DateTime<Utc>, horizon_hours: u32) -> Vec<ForecastSlot> {
        let mut slots = Vec::with_capacity(self.points.len());
        let mut last_hours = DEFAULT_SLOT_HOURS;

        for (i, point) in self.points.iter().enumerate() {
            let duration_hours = match self.points.get(i + 1) {
                Some(next) => hours_between(point.timestamp, next.timestamp),
                None => last_hours,
            };
            last_hours = duration_hours;

            let end = point.timestamp + duration_from_hours(duration_hours);
            if end <= now {
                continue;
            }
            slots.push(ForecastSlot {
                start: point.timestamp,
                duration_hours,
                weather: *point,
            });
        }

        let horizon = f64::from(horizon_hours);
        let mut covered = 0.0;
        slots
            .into_iter()
            .take_while(|slot| {
                let keep = covered < horizon;
                covered += slot.duration_hours;
                keep
            })
            .collect()
    }
}

/// A forecast point paired with the length of time it covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastSlot {
    pub start: DateTime<Utc>,
    pub duration_hours: f64,
    pub weather: WeatherPoint,
}

impl ForecastSlot {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + duration_from_hours(self.duration_hours)
    }
}

pub(crate) fn hours_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (b - a).num_milliseconds() as f64 / 3_600_000.0
}

pub(crate) fn duration_from_hours(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}
