//! System Configuration - every tunable of the control engine as TOML
//!
//! Each section implements `Default` with the values in `defaults.rs`, so a
//! missing file or a partial file both yield a complete, valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::types::{BuildingMass, CopCurve, HeatingSystem, ThermalParameters};

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "HEATWISE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "heatwise.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `SystemConfig::load()` which searches:
/// 1. `$HEATWISE_CONFIG` env var
/// 2. `./heatwise.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Comfort targets and building description
    #[serde(default)]
    pub house: HouseConfig,

    /// Thermal model priors and plant constants
    #[serde(default)]
    pub model: ModelConfig,

    /// Control loop and candidate selection
    #[serde(default)]
    pub control: ControlConfig,

    /// Learning engine and history retention
    #[serde(default)]
    pub learning: LearningConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP status API
    #[serde(default)]
    pub server: ServerConfig,
}

impl SystemConfig {
    /// Load configuration using the standard search order:
    /// 1. `$HEATWISE_CONFIG` environment variable
    /// 2. `./heatwise.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// A file that exists but fails to parse or validate is skipped with a
    /// warning and the search continues.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate every option once, before anything reaches the core.
    ///
    /// Impossible values are errors; suspicious ones are logged warnings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_physical_ranges(self);
        for w in &warnings {
            warn!(field = %w.field, "{}", w);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Mass- and emitter-seeded parameters used before learning converges.
    pub fn prior_parameters(&self) -> ThermalParameters {
        let lag = self.model.thermal_lag_hours
            * self.house.building_thermal_mass.lag_factor()
            * self.house.heating_system_type.lag_factor();
        ThermalParameters {
            thermal_lag_hours: lag,
            solar_gain_factor: self.model.solar_gain_factor,
            wind_factor: self.model.wind_factor,
            building_thermal_mass: self.house.building_thermal_mass,
            cop_curve: CopCurve::carnot_prior(self.house.heating_system_type),
        }
        .clamped()
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// [house]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseConfig {
    /// Daytime comfort target (°C)
    #[serde(default = "default_target_temperature")]
    pub target_temperature: f64,

    /// Night setback depth (K), 0 disables
    #[serde(default = "default_night_setback")]
    pub night_setback: f64,

    #[serde(default)]
    pub heating_system_type: HeatingSystem,

    #[serde(default)]
    pub building_thermal_mass: BuildingMass,

    /// Local hour the night window starts (0-23)
    #[serde(default = "default_night_start_hour")]
    pub night_start_hour: u32,

    /// Local hour the day window starts (0-23)
    #[serde(default = "default_day_start_hour")]
    pub day_start_hour: u32,

    /// Local time offset from UTC used for the day/night windows (minutes)
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_target_temperature() -> f64 { defaults::TARGET_TEMPERATURE_C }
fn default_night_setback() -> f64 { defaults::NIGHT_SETBACK_K }
fn default_night_start_hour() -> u32 { defaults::NIGHT_START_HOUR }
fn default_day_start_hour() -> u32 { defaults::DAY_START_HOUR }

impl Default for HouseConfig {
    fn default() -> Self {
        Self {
            target_temperature: default_target_temperature(),
            night_setback: default_night_setback(),
            heating_system_type: HeatingSystem::default(),
            building_thermal_mass: BuildingMass::default(),
            night_start_hour: default_night_start_hour(),
            day_start_hour: default_day_start_hour(),
            utc_offset_minutes: 0,
        }
    }
}

// ============================================================================
// [model]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Thermal-lag prior before mass and emitter factors (hours)
    #[serde(default = "default_thermal_lag_hours")]
    pub thermal_lag_hours: f64,

    /// Solar-gain prior (0-1)
    #[serde(default = "default_solar_gain_factor")]
    pub solar_gain_factor: f64,

    /// Wind-loss prior (0-1)
    #[serde(default = "default_wind_factor")]
    pub wind_factor: f64,

    /// Equilibrium rise above outdoor at full output (K)
    #[serde(default = "default_heating_capacity_k")]
    pub heating_capacity_k: f64,

    /// Thermal output at full modulation (kW)
    #[serde(default = "default_rated_output_kw")]
    pub rated_output_kw: f64,

    /// Irradiance giving 1 K per unit of solar gain factor (W/m²)
    #[serde(default = "default_solar_reference")]
    pub solar_reference_w_m2: f64,
}

fn default_thermal_lag_hours() -> f64 { defaults::THERMAL_LAG_HOURS }
fn default_solar_gain_factor() -> f64 { defaults::SOLAR_GAIN_FACTOR }
fn default_wind_factor() -> f64 { defaults::WIND_FACTOR }
fn default_heating_capacity_k() -> f64 { defaults::HEATING_CAPACITY_K }
fn default_rated_output_kw() -> f64 { defaults::RATED_OUTPUT_KW }
fn default_solar_reference() -> f64 { defaults::SOLAR_REFERENCE_W_M2 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            thermal_lag_hours: default_thermal_lag_hours(),
            solar_gain_factor: default_solar_gain_factor(),
            wind_factor: default_wind_factor(),
            heating_capacity_k: default_heating_capacity_k(),
            rated_output_kw: default_rated_output_kw(),
            solar_reference_w_m2: default_solar_reference(),
        }
    }
}

// ============================================================================
// [control]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Planning horizon (6-48 hours)
    #[serde(default = "default_prediction_horizon_hours")]
    pub prediction_horizon_hours: u32,

    /// Compressor may not stop within this long of a start (10-120 min)
    #[serde(default = "default_min_runtime_minutes")]
    pub min_runtime_minutes: u32,

    /// Modulation cap (20-100 %)
    #[serde(default = "default_max_modulation")]
    pub max_modulation: f64,

    /// Modulation used when minimum runtime forces the compressor on (%)
    #[serde(default = "default_min_running_modulation")]
    pub min_running_modulation: f64,

    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Cached inputs stay usable for this many tick intervals
    #[serde(default = "default_staleness_factor")]
    pub staleness_factor: f64,

    #[serde(default = "default_comfort_deadband_k")]
    pub comfort_deadband_k: f64,

    #[serde(default = "default_energy_weight")]
    pub energy_weight: f64,

    #[serde(default = "default_comfort_weight")]
    pub comfort_weight: f64,

    #[serde(default = "default_max_setback_windows_per_night")]
    pub max_setback_windows_per_night: u32,

    /// Consecutive failed ticks before the health condition is raised
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_preheat_max_boost_k")]
    pub preheat_max_boost_k: f64,
}

fn default_prediction_horizon_hours() -> u32 { defaults::PREDICTION_HORIZON_HOURS }
fn default_min_runtime_minutes() -> u32 { defaults::MIN_RUNTIME_MINUTES }
fn default_max_modulation() -> f64 { defaults::MAX_MODULATION_PCT }
fn default_min_running_modulation() -> f64 { defaults::MIN_RUNNING_MODULATION_PCT }
fn default_tick_interval_secs() -> u64 { defaults::TICK_INTERVAL_SECS }
fn default_fetch_timeout_secs() -> u64 { defaults::FETCH_TIMEOUT_SECS }
fn default_staleness_factor() -> f64 { defaults::STALENESS_FACTOR }
fn default_comfort_deadband_k() -> f64 { defaults::COMFORT_DEADBAND_K }
fn default_energy_weight() -> f64 { defaults::ENERGY_WEIGHT }
fn default_comfort_weight() -> f64 { defaults::COMFORT_WEIGHT }
fn default_max_setback_windows_per_night() -> u32 { defaults::MAX_SETBACK_WINDOWS_PER_NIGHT }
fn default_failure_threshold() -> u32 { defaults::FAILURE_THRESHOLD }
fn default_preheat_max_boost_k() -> f64 { defaults::PREHEAT_MAX_BOOST_K }

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            prediction_horizon_hours: default_prediction_horizon_hours(),
            min_runtime_minutes: default_min_runtime_minutes(),
            max_modulation: default_max_modulation(),
            min_running_modulation: default_min_running_modulation(),
            tick_interval_secs: default_tick_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            staleness_factor: default_staleness_factor(),
            comfort_deadband_k: default_comfort_deadband_k(),
            energy_weight: default_energy_weight(),
            comfort_weight: default_comfort_weight(),
            max_setback_windows_per_night: default_max_setback_windows_per_night(),
            failure_threshold: default_failure_threshold(),
            preheat_max_boost_k: default_preheat_max_boost_k(),
        }
    }
}

impl ControlConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Maximum age at which a cached forecast or reading is still usable.
    pub fn staleness_limit(&self) -> chrono::Duration {
        let secs = self.tick_interval_secs as f64 * self.staleness_factor;
        chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
    }

    pub fn min_runtime(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.min_runtime_minutes))
    }
}

// ============================================================================
// [learning]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Retrain sensitivity: how far one retrain moves the parameters
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    #[serde(default = "default_retrain_interval_secs")]
    pub retrain_interval_secs: u64,

    #[serde(default = "default_retrain_every_samples")]
    pub retrain_every_samples: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum records kept in the history store
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Records older than this are ignored by retraining
    #[serde(default = "default_max_record_age_days")]
    pub max_record_age_days: i64,

    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f64,

    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_learning_rate() -> f64 { defaults::LEARNING_RATE }
fn default_min_samples() -> usize { defaults::MIN_SAMPLES }
fn default_retrain_interval_secs() -> u64 { defaults::RETRAIN_INTERVAL_SECS }
fn default_retrain_every_samples() -> u64 { defaults::RETRAIN_EVERY_SAMPLES }
fn default_poll_interval_secs() -> u64 { defaults::RETRAIN_POLL_SECS }
fn default_history_capacity() -> usize { defaults::HISTORY_CAPACITY }
fn default_max_record_age_days() -> i64 { defaults::MAX_RECORD_AGE_DAYS }
fn default_holdout_fraction() -> f64 { defaults::HOLDOUT_FRACTION }
fn default_n_trees() -> usize { defaults::FOREST_TREES }
fn default_max_depth() -> usize { defaults::FOREST_MAX_DEPTH }
fn default_min_samples_leaf() -> usize { defaults::FOREST_MIN_SAMPLES_LEAF }
fn default_seed() -> u64 { defaults::FOREST_SEED }

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            min_samples: default_min_samples(),
            retrain_interval_secs: default_retrain_interval_secs(),
            retrain_every_samples: default_retrain_every_samples(),
            poll_interval_secs: default_poll_interval_secs(),
            history_capacity: default_history_capacity(),
            max_record_age_days: default_max_record_age_days(),
            holdout_fraction: default_holdout_fraction(),
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            min_samples_leaf: default_min_samples_leaf(),
            seed: default_seed(),
        }
    }
}

// ============================================================================
// [storage] / [server]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the history journal, learning-state database and lock
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf { PathBuf::from(defaults::DATA_DIR) }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String { defaults::SERVER_ADDR.to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: default_server_addr() }
    }
}
