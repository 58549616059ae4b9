//! Thermal parameter types: building classes, COP curve, ThermalParameters

use serde::{Deserialize, Serialize};

// ============================================================================
// Physical Bounds
// ============================================================================

/// Physically valid ranges. Every parameter set leaving the learning
/// engine is clamped into these.
pub mod bounds {
    pub const THERMAL_LAG_MIN_HOURS: f64 = 0.5;
    pub const THERMAL_LAG_MAX_HOURS: f64 = 12.0;
    pub const SOLAR_GAIN_MIN: f64 = 0.0;
    pub const SOLAR_GAIN_MAX: f64 = 1.0;
    pub const WIND_FACTOR_MIN: f64 = 0.0;
    pub const WIND_FACTOR_MAX: f64 = 1.0;
    pub const COP_MIN: f64 = 1.0;
    pub const COP_MAX: f64 = 7.0;
}

/// Building thermal mass class, used to seed the thermal-lag prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildingMass {
    Low,
    #[default]
    Medium,
    High,
}

impl BuildingMass {
    /// Multiplier applied to the configured thermal-lag prior.
    pub fn lag_factor(self) -> f64 {
        match self {
            BuildingMass::Low => 0.7,
            BuildingMass::Medium => 1.0,
            BuildingMass::High => 1.5,
        }
    }
}

impl std::fmt::Display for BuildingMass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildingMass::Low => write!(f, "low"),
            BuildingMass::Medium => write!(f, "medium"),
            BuildingMass::High => write!(f, "high"),
        }
    }
}

/// Heat emitter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeatingSystem {
    #[default]
    Underfloor,
    Radiator,
    Mixed,
}

impl HeatingSystem {
    /// Multiplier applied to the configured thermal-lag prior.
    ///
    /// Screed floors respond slowly, radiators quickly.
    pub fn lag_factor(self) -> f64 {
        match self {
            HeatingSystem::Radiator => 0.5,
            HeatingSystem::Underfloor => 1.2,
            HeatingSystem::Mixed => 0.8,
        }
    }

    /// Typical design flow temperature (°C) for the COP prior.
    pub fn design_flow_temp(self) -> f64 {
        match self {
            HeatingSystem::Underfloor => 35.0,
            HeatingSystem::Mixed => 42.0,
            HeatingSystem::Radiator => 50.0,
        }
    }
}

impl std::fmt::Display for HeatingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeatingSystem::Underfloor => write!(f, "underfloor"),
            HeatingSystem::Radiator => write!(f, "radiator"),
            HeatingSystem::Mixed => write!(f, "mixed"),
        }
    }
}

// ============================================================================
// COP Curve
// ============================================================================

/// One bucket of the COP curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CopPoint {
    /// Bucket centre, outdoor temperature (°C)
    pub outdoor_temp: f64,
    pub cop: f64,
}

/// Expected COP as a function of outdoor temperature.
///
/// Buckets are sorted by temperature. Lookup interpolates linearly between
/// neighbours and holds the end values outside the covered range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopCurve {
    points: Vec<CopPoint>,
}

impl CopCurve {
    /// Bucket centres used for priors and learned curves (°C).
    pub const BUCKETS: [f64; 9] = [-20.0, -15.0, -10.0, -5.0, 0.0, 5.0, 10.0, 15.0, 20.0];

    /// Build a curve, sorting buckets and clamping every COP into bounds.
    /// Non-finite entries are dropped.
    pub fn new(points: Vec<CopPoint>) -> Self {
        let mut points: Vec<CopPoint> = points
            .into_iter()
            .filter(|p| p.outdoor_temp.is_finite() && p.cop.is_finite())
            .map(|p| CopPoint {
                outdoor_temp: p.outdoor_temp,
                cop: p.cop.clamp(bounds::COP_MIN, bounds::COP_MAX),
            })
            .collect();
        points.sort_by(|a, b| a.outdoor_temp.total_cmp(&b.outdoor_temp));
        points.dedup_by(|a, b| a.outdoor_temp == b.outdoor_temp);
        Self { points }
    }

    /// Flat curve, mostly useful in tests.
    pub fn constant(cop: f64) -> Self {
        Self::new(
            Self::BUCKETS
                .iter()
                .map(|&t| CopPoint { outdoor_temp: t, cop })
                .collect(),
        )
    }

    /// Prior curve: 45 % of the Carnot COP at the emitter's design flow
    /// temperature, clamped to [2, 6].
    pub fn carnot_prior(system: HeatingSystem) -> Self {
        let flow = system.design_flow_temp();
        Self::new(
            Self::BUCKETS
                .iter()
                .map(|&outdoor| {
                    let lift = (flow - outdoor).max(1.0);
                    let carnot = (flow + 273.15) / lift;
                    CopPoint {
                        outdoor_temp: outdoor,
                        cop: (carnot * 0.45).clamp(2.0, 6.0),
                    }
                })
                .collect(),
        )
    }

    pub fn points(&self) -> &[CopPoint] {
        &self.points
    }

    /// Expected COP at the given outdoor temperature.
    pub fn cop_at(&self, outdoor_temp: f64) -> f64 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return bounds::COP_MIN;
        };
        if outdoor_temp <= first.outdoor_temp {
            return first.cop;
        }
        if outdoor_temp >= last.outdoor_temp {
            return last.cop;
        }
        for pair in self.points.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if outdoor_temp <= hi.outdoor_temp {
                let t = (outdoor_temp - lo.outdoor_temp) / (hi.outdoor_temp - lo.outdoor_temp);
                return lo.cop + t * (hi.cop - lo.cop);
            }
        }
        last.cop
    }
}

// ============================================================================
// ThermalParameters
// ============================================================================

/// Effective physical parameters of the building and heat pump.
///
/// Owned by the learning engine. Everyone else receives read-only
/// snapshots inside a `LearningState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalParameters {
    /// First-order time constant of the indoor temperature (hours)
    pub thermal_lag_hours: f64,
    /// Fraction of irradiance converted into useful indoor gain (0-1)
    pub solar_gain_factor: f64,
    /// Additional envelope loss per m/s of wind (0-1)
    pub wind_factor: f64,
    pub building_thermal_mass: BuildingMass,
    pub cop_curve: CopCurve,
}

impl ThermalParameters {
    /// Clamp every value into its physical range.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.thermal_lag_hours = clamp_or(
            self.thermal_lag_hours,
            bounds::THERMAL_LAG_MIN_HOURS,
            bounds::THERMAL_LAG_MAX_HOURS,
        );
        self.solar_gain_factor =
            clamp_or(self.solar_gain_factor, bounds::SOLAR_GAIN_MIN, bounds::SOLAR_GAIN_MAX);
        self.wind_factor =
            clamp_or(self.wind_factor, bounds::WIND_FACTOR_MIN, bounds::WIND_FACTOR_MAX);
        self
    }

    /// True when every value already lies inside its physical range.
    pub fn within_bounds(&self) -> bool {
        (bounds::THERMAL_LAG_MIN_HOURS..=bounds::THERMAL_LAG_MAX_HOURS)
            .contains(&self.thermal_lag_hours)
            && (bounds::SOLAR_GAIN_MIN..=bounds::SOLAR_GAIN_MAX).contains(&self.solar_gain_factor)
            && (bounds::WIND_FACTOR_MIN..=bounds::WIND_FACTOR_MAX).contains(&self.wind_factor)
            && self
                .cop_curve
                .points()
                .iter()
                .all(|p| (bounds::COP_MIN..=bounds::COP_MAX).contains(&p.cop))
    }
}

/// Clamp, mapping NaN to the lower bound.
fn clamp_or(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}
