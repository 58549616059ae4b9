//! Data quality filter for retraining
//!
//! Rejects observation records that would poison the regressor:
//! - non-finite values (sensor dropouts serialised as NaN)
//! - implausible indoor or outdoor temperatures
//! - modulation outside 0-100 %
//! - intervals that are empty or span a long outage
//! - records older than the retention window

use chrono::{DateTime, Duration, Utc};

use crate::types::ObservationRecord;

const INDOOR_RANGE_C: (f64, f64) = (-10.0, 40.0);
const OUTDOOR_RANGE_C: (f64, f64) = (-50.0, 50.0);
const MAX_INTERVAL_HOURS: f64 = 2.0;
const MAX_WIND_MS: f64 = 60.0;
const MAX_IRRADIANCE_W_M2: f64 = 1_500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    NonFinite,
    ImplausibleTemperature,
    InvalidModulation,
    InvalidInterval,
    ImplausibleWeather,
    TooOld,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite => write!(f, "non-finite value"),
            Self::ImplausibleTemperature => write!(f, "temperature out of plausible range"),
            Self::InvalidModulation => write!(f, "modulation outside 0-100 %"),
            Self::InvalidInterval => write!(f, "interval empty or longer than 2 h"),
            Self::ImplausibleWeather => write!(f, "wind or irradiance out of range"),
            Self::TooOld => write!(f, "older than retention window"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterResult<'a> {
    pub valid: Vec<&'a ObservationRecord>,
    pub rejected: usize,
    /// Most frequent rejection reason, if anything was rejected
    pub primary_rejection: Option<RejectionReason>,
}

pub struct DataQualityFilter;

impl DataQualityFilter {
    pub fn filter(
        records: &[ObservationRecord],
        now: DateTime<Utc>,
        max_age_days: i64,
    ) -> FilterResult<'_> {
        let cutoff = now - Duration::days(max_age_days);
        let mut valid = Vec::with_capacity(records.len());
        let mut counts: Vec<(RejectionReason, usize)> = Vec::new();

        for record in records {
            match Self::validate(record, cutoff) {
                Ok(()) => valid.push(record),
                Err(reason) => match counts.iter_mut().find(|(r, _)| *r == reason) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((reason, 1)),
                },
            }
        }

        let rejected = counts.iter().map(|(_, n)| n).sum();
        let primary_rejection = counts
            .iter()
            .max_by_key(|(_, n)| *n)
            .map(|(reason, _)| *reason);

        FilterResult { valid, rejected, primary_rejection }
    }

    fn validate(r: &ObservationRecord, cutoff: DateTime<Utc>) -> Result<(), RejectionReason> {
        let required = [
            r.indoor_temp,
            r.prior_indoor_temp,
            r.outdoor_temp,
            r.heat_pump_modulation_pct,
            r.interval_hours,
        ];
        if required.iter().any(|v| !v.is_finite()) {
            return Err(RejectionReason::NonFinite);
        }
        if r.timestamp < cutoff {
            return Err(RejectionReason::TooOld);
        }
        let indoor_ok = |t: f64| (INDOOR_RANGE_C.0..=INDOOR_RANGE_C.1).contains(&t);
        if !indoor_ok(r.indoor_temp)
            || !indoor_ok(r.prior_indoor_temp)
            || !(OUTDOOR_RANGE_C.0..=OUTDOOR_RANGE_C.1).contains(&r.outdoor_temp)
        {
            return Err(RejectionReason::ImplausibleTemperature);
        }
        if !(0.0..=100.0).contains(&r.heat_pump_modulation_pct) {
            return Err(RejectionReason::InvalidModulation);
        }
        if r.interval_hours <= 0.0 || r.interval_hours > MAX_INTERVAL_HOURS {
            return Err(RejectionReason::InvalidInterval);
        }
        let wind_ok = r.wind_speed.map_or(true, |w| w.is_finite() && (0.0..=MAX_WIND_MS).contains(&w));
        let sun_ok = r
            .solar_irradiance
            .map_or(true, |s| s.is_finite() && (0.0..=MAX_IRRADIANCE_W_M2).contains(&s));
        if !wind_ok || !sun_ok {
            return Err(RejectionReason::ImplausibleWeather);
        }
        Ok(())
    }
}
