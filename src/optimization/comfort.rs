//! Comfort reference and day/night windows

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Timelike, Utc};

use crate::config::HouseConfig;

/// Comfort target over time.
///
/// The target applies during the day; during the night window the
/// reference drops by `night_setback`. Windows are evaluated in local time
/// given by a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComfortProfile {
    pub target: f64,
    pub night_setback: f64,
    night_start_hour: u32,
    day_start_hour: u32,
    offset: FixedOffset,
}

impl ComfortProfile {
    pub fn new(
        target: f64,
        night_setback: f64,
        night_start_hour: u32,
        day_start_hour: u32,
        utc_offset_minutes: i32,
    ) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix());
        Self {
            target,
            night_setback: night_setback.max(0.0),
            night_start_hour: night_start_hour % 24,
            day_start_hour: day_start_hour % 24,
            offset,
        }
    }

    fn local_hour(&self, t: DateTime<Utc>) -> u32 {
        t.with_timezone(&self.offset).hour()
    }

    /// Whether `t` falls in the night window.
    pub fn is_night(&self, t: DateTime<Utc>) -> bool {
        let hour = self.local_hour(t);
        let (start, end) = (self.night_start_hour, self.day_start_hour);
        match start.cmp(&end) {
            std::cmp::Ordering::Greater => hour >= start || hour < end,
            std::cmp::Ordering::Less => hour >= start && hour < end,
            std::cmp::Ordering::Equal => false,
        }
    }

    /// Comfort reference temperature at `t`.
    pub fn reference(&self, t: DateTime<Utc>) -> f64 {
        if self.is_night(t) {
            self.target - self.night_setback
        } else {
            self.target
        }
    }

    /// Identifies which night `t` belongs to: the local date on which the
    /// preceding day window started.
    pub fn night_key(&self, t: DateTime<Utc>) -> NaiveDate {
        let shifted = t.with_timezone(&self.offset) - Duration::hours(i64::from(self.day_start_hour));
        shifted.date_naive()
    }
}

impl From<&HouseConfig> for ComfortProfile {
    fn from(house: &HouseConfig) -> Self {
        Self::new(
            house.target_temperature,
            house.night_setback,
            house.night_start_hour,
            house.day_start_hour,
            house.utc_offset_minutes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn test_night_window_wraps_midnight() {
        let c = ComfortProfile::new(21.0, 2.0, 22, 6, 0);
        assert!(c.is_night(at(23)));
        assert!(c.is_night(at(3)));
        assert!(!c.is_night(at(6)));
        assert!(!c.is_night(at(12)));
        assert_eq!(c.reference(at(23)), 19.0);
        assert_eq!(c.reference(at(12)), 21.0);
    }

    #[test]
    fn test_offset_shifts_window() {
        // UTC+2: 21:00 UTC is 23:00 local
        let c = ComfortProfile::new(21.0, 2.0, 22, 6, 120);
        assert!(c.is_night(at(21)));
        assert!(!c.is_night(at(19)));
    }

    #[test]
    fn test_night_key_groups_across_midnight() {
        let c = ComfortProfile::new(21.0, 2.0, 22, 6, 0);
        let evening = at(23);
        let morning = Utc.with_ymd_and_hms(2024, 1, 11, 4, 0, 0).unwrap();
        assert_eq!(c.night_key(evening), c.night_key(morning));
        let next_evening = Utc.with_ymd_and_hms(2024, 1, 11, 23, 0, 0).unwrap();
        assert_ne!(c.night_key(evening), c.night_key(next_evening));
    }
}
