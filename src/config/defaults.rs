//! System-wide default constants.
//!
//! Values the configuration falls back to, plus the fixed physical and
//! algorithmic constants that are not exposed as options.

// ============================================================================
// House
// ============================================================================

/// Comfort target (°C).
pub const TARGET_TEMPERATURE_C: f64 = 21.0;

/// Night setback depth (K).
pub const NIGHT_SETBACK_K: f64 = 2.0;

/// Local hour at which the night window starts.
pub const NIGHT_START_HOUR: u32 = 22;

/// Local hour at which the day window starts.
pub const DAY_START_HOUR: u32 = 6;

// ============================================================================
// Thermal Model Priors
// ============================================================================

/// Thermal-lag prior before mass and emitter factors (hours).
pub const THERMAL_LAG_HOURS: f64 = 4.0;

pub const SOLAR_GAIN_FACTOR: f64 = 0.3;

pub const WIND_FACTOR: f64 = 0.1;

/// Equilibrium rise above outdoor temperature at 100 % modulation (K).
///
/// Roughly the design temperature difference the heat pump is sized for.
pub const HEATING_CAPACITY_K: f64 = 30.0;

/// Thermal output at 100 % modulation (kW).
pub const RATED_OUTPUT_KW: f64 = 9.0;

/// Irradiance that produces 1 K of gain per unit of solar_gain_factor (W/m²).
pub const SOLAR_REFERENCE_W_M2: f64 = 100.0;

// ============================================================================
// Control Loop
// ============================================================================

pub const PREDICTION_HORIZON_HOURS: u32 = 24;

pub const MIN_RUNTIME_MINUTES: u32 = 30;

/// Maximum modulation cap (%).
pub const MAX_MODULATION_PCT: f64 = 100.0;

/// Lowest modulation the compressor runs at once on (%).
pub const MIN_RUNNING_MODULATION_PCT: f64 = 20.0;

/// Modulation at or below this is treated as off (%).
pub const OFF_THRESHOLD_PCT: f64 = 1.0;

/// Control tick period (seconds).
pub const TICK_INTERVAL_SECS: u64 = 300;

/// Timeout applied to every forecast or telemetry fetch (seconds).
pub const FETCH_TIMEOUT_SECS: u64 = 20;

/// Cached inputs stay usable for this many tick intervals.
pub const STALENESS_FACTOR: f64 = 2.0;

/// Deviation from the comfort reference that costs nothing (K).
pub const COMFORT_DEADBAND_K: f64 = 0.5;

pub const ENERGY_WEIGHT: f64 = 1.0;

pub const COMFORT_WEIGHT: f64 = 10.0;

pub const MAX_SETBACK_WINDOWS_PER_NIGHT: u32 = 1;

/// Consecutive failed ticks before a health condition is raised.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Largest pre-heat boost above target (K).
pub const PREHEAT_MAX_BOOST_K: f64 = 2.0;

/// Pre-heat boost per kelvin of predicted demand rise.
pub const PREHEAT_BOOST_PER_K: f64 = 0.2;

/// Demand rise that qualifies a window as cold (K of equilibrium heat).
pub const PREHEAT_DEMAND_RISE_K: f64 = 5.0;

/// Passive solar gain that qualifies a slot as mild (K).
pub const MILD_SOLAR_GAIN_K: f64 = 1.0;

/// Outdoor temperature this close to target qualifies a slot as mild (K).
pub const MILD_OUTDOOR_MARGIN_K: f64 = 6.0;

// ============================================================================
// Learning Engine
// ============================================================================

pub const LEARNING_RATE: f64 = 0.05;

/// Records needed before the engine leaves its prior.
pub const MIN_SAMPLES: usize = 50;

pub const RETRAIN_INTERVAL_SECS: u64 = 86_400;

/// New records that trigger a retrain ahead of the interval.
///
/// 288 = one day at a 5-minute tick.
pub const RETRAIN_EVERY_SAMPLES: u64 = 288;

/// How often the retrain task checks whether a retrain is due (seconds).
pub const RETRAIN_POLL_SECS: u64 = 60;

/// History ring capacity (records).
///
/// 105 120 = one year at a 5-minute tick.
pub const HISTORY_CAPACITY: usize = 105_120;

pub const MAX_RECORD_AGE_DAYS: i64 = 365;

/// Fraction of the most recent records held out for scoring.
pub const HOLDOUT_FRACTION: f64 = 0.2;

pub const FOREST_TREES: usize = 50;

pub const FOREST_MAX_DEPTH: usize = 10;

pub const FOREST_MIN_SAMPLES_LEAF: usize = 3;

pub const FOREST_SEED: u64 = 42;

/// Holdout MAE at which confidence reaches zero (K).
pub const CONFIDENCE_MAE_SCALE_K: f64 = 2.0;

/// Operating points evaluated when deriving sensitivities.
pub const SENSITIVITY_PROBE_POINTS: usize = 64;

// ============================================================================
// Storage & Server
// ============================================================================

pub const DATA_DIR: &str = "./data";

pub const SERVER_ADDR: &str = "0.0.0.0:8099";
