//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Unknown keys are found by walking the raw `toml::Value` tree before
//! serde deserialization; they only ever produce warnings. Range checks run
//! on the typed config and split into hard errors and warnings.

use std::collections::HashSet;

use super::SystemConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of `SystemConfig`.
///
/// Must be kept in step with the structs in `system_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        "house",
        "house.target_temperature",
        "house.night_setback",
        "house.heating_system_type",
        "house.building_thermal_mass",
        "house.night_start_hour",
        "house.day_start_hour",
        "house.utc_offset_minutes",
        "model",
        "model.thermal_lag_hours",
        "model.solar_gain_factor",
        "model.wind_factor",
        "model.heating_capacity_k",
        "model.rated_output_kw",
        "model.solar_reference_w_m2",
        "control",
        "control.prediction_horizon_hours",
        "control.min_runtime_minutes",
        "control.max_modulation",
        "control.min_running_modulation",
        "control.tick_interval_secs",
        "control.fetch_timeout_secs",
        "control.staleness_factor",
        "control.comfort_deadband_k",
        "control.energy_weight",
        "control.comfort_weight",
        "control.max_setback_windows_per_night",
        "control.failure_threshold",
        "control.preheat_max_boost_k",
        "learning",
        "learning.learning_rate",
        "learning.min_samples",
        "learning.retrain_interval_secs",
        "learning.retrain_every_samples",
        "learning.poll_interval_secs",
        "learning.history_capacity",
        "learning.max_record_age_days",
        "learning.holdout_fraction",
        "learning.n_trees",
        "learning.max_depth",
        "learning.min_samples_leaf",
        "learning.seed",
        "storage",
        "storage.data_dir",
        "server",
        "server.addr",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Collect every dotted key path in a `toml::Value` tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3, ties going to the
/// lexicographically smaller key.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

/// Warnings for every key in `raw_toml` that the config does not know.
///
/// Parse errors return no warnings; serde reports them afterwards.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physical Range Validation
// ============================================================================

fn check_range(errors: &mut Vec<String>, field: &str, value: f64, min: f64, max: f64) {
    if !value.is_finite() || value < min || value > max {
        errors.push(format!("{field} = {value} is outside valid range ({min}-{max})"));
    }
}

fn warn_outside(warnings: &mut Vec<ValidationWarning>, field: &str, value: f64, min: f64, max: f64) {
    if value < min || value > max {
        warnings.push(ValidationWarning {
            field: field.to_string(),
            message: format!("{field} = {value} is outside typical range ({min}-{max})"),
            suggestion: None,
        });
    }
}

/// Range-check a parsed config.
///
/// Returns (errors, warnings): errors must prevent startup, warnings are
/// suspicious but usable.
pub fn validate_physical_ranges(config: &SystemConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let h = &config.house;
    check_range(&mut errors, "house.target_temperature", h.target_temperature, 15.0, 30.0);
    check_range(&mut errors, "house.night_setback", h.night_setback, 0.0, 10.0);
    if h.night_start_hour > 23 || h.day_start_hour > 23 {
        errors.push(format!(
            "house.night_start_hour ({}) and house.day_start_hour ({}) must be 0-23",
            h.night_start_hour, h.day_start_hour
        ));
    } else if h.night_start_hour == h.day_start_hour {
        errors.push("house.night_start_hour must differ from house.day_start_hour".to_string());
    }
    if h.utc_offset_minutes.abs() > 14 * 60 {
        errors.push(format!(
            "house.utc_offset_minutes = {} exceeds +/-14 hours",
            h.utc_offset_minutes
        ));
    }

    let m = &config.model;
    if !m.thermal_lag_hours.is_finite() || m.thermal_lag_hours <= 0.0 {
        errors.push(format!(
            "model.thermal_lag_hours = {} must be > 0",
            m.thermal_lag_hours
        ));
    } else {
        warn_outside(&mut warnings, "model.thermal_lag_hours", m.thermal_lag_hours, 0.5, 12.0);
    }
    check_range(&mut errors, "model.solar_gain_factor", m.solar_gain_factor, 0.0, 1.0);
    check_range(&mut errors, "model.wind_factor", m.wind_factor, 0.0, 1.0);
    check_range(&mut errors, "model.heating_capacity_k", m.heating_capacity_k, 1.0, 80.0);
    check_range(&mut errors, "model.rated_output_kw", m.rated_output_kw, 0.5, 100.0);
    check_range(&mut errors, "model.solar_reference_w_m2", m.solar_reference_w_m2, 1.0, 1000.0);

    let c = &config.control;
    check_range(
        &mut errors,
        "control.prediction_horizon_hours",
        f64::from(c.prediction_horizon_hours),
        6.0,
        48.0,
    );
    check_range(
        &mut errors,
        "control.min_runtime_minutes",
        f64::from(c.min_runtime_minutes),
        10.0,
        120.0,
    );
    check_range(&mut errors, "control.max_modulation", c.max_modulation, 20.0, 100.0);
    check_range(
        &mut errors,
        "control.min_running_modulation",
        c.min_running_modulation,
        0.0,
        c.max_modulation,
    );
    if c.tick_interval_secs == 0 {
        errors.push("control.tick_interval_secs must be > 0".to_string());
    }
    if c.fetch_timeout_secs == 0 {
        errors.push("control.fetch_timeout_secs must be > 0".to_string());
    } else if c.fetch_timeout_secs >= c.tick_interval_secs {
        warnings.push(ValidationWarning {
            field: "control.fetch_timeout_secs".to_string(),
            message: format!(
                "control.fetch_timeout_secs = {} is not shorter than the tick interval ({} s)",
                c.fetch_timeout_secs, c.tick_interval_secs
            ),
            suggestion: None,
        });
    }
    check_range(&mut errors, "control.staleness_factor", c.staleness_factor, 1.0, 100.0);
    check_range(&mut errors, "control.comfort_deadband_k", c.comfort_deadband_k, 0.0, 5.0);
    check_range(&mut errors, "control.energy_weight", c.energy_weight, 0.0, 1000.0);
    check_range(&mut errors, "control.comfort_weight", c.comfort_weight, 0.0, 1000.0);
    check_range(&mut errors, "control.preheat_max_boost_k", c.preheat_max_boost_k, 0.0, 5.0);
    if c.failure_threshold == 0 {
        errors.push("control.failure_threshold must be >= 1".to_string());
    }

    let l = &config.learning;
    if !l.learning_rate.is_finite() || l.learning_rate <= 0.0 || l.learning_rate > 1.0 {
        errors.push(format!(
            "learning.learning_rate = {} must be in (0, 1]",
            l.learning_rate
        ));
    } else {
        warn_outside(&mut warnings, "learning.learning_rate", l.learning_rate, 0.001, 0.5);
    }
    if l.min_samples < 10 {
        errors.push(format!("learning.min_samples = {} must be >= 10", l.min_samples));
    }
    if l.history_capacity < l.min_samples {
        errors.push(format!(
            "learning.history_capacity ({}) must be >= learning.min_samples ({})",
            l.history_capacity, l.min_samples
        ));
    }
    check_range(&mut errors, "learning.holdout_fraction", l.holdout_fraction, 0.05, 0.5);
    if l.n_trees == 0 || l.max_depth == 0 || l.min_samples_leaf == 0 {
        errors.push("learning.n_trees, max_depth and min_samples_leaf must be >= 1".to_string());
    }
    if l.max_record_age_days <= 0 {
        errors.push(format!(
            "learning.max_record_age_days = {} must be > 0",
            l.max_record_age_days
        ));
    }
    if l.retrain_interval_secs == 0 || l.poll_interval_secs == 0 {
        errors.push("learning.retrain_interval_secs and poll_interval_secs must be > 0".to_string());
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("lag", "lag"), 0);
        assert_eq!(levenshtein("setbak", "setback"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [house]
            target_temperature = 21.0
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"house".to_string()));
        assert!(keys.contains(&"house.target_temperature".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys(
            r#"
[house]
night_setbak = 1.5
"#,
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].suggestion.as_deref(), Some("house.night_setback"));
    }

    #[test]
    fn test_valid_keys_produce_zero_warnings() {
        let warnings = validate_unknown_keys(
            r#"
[model]
thermal_lag_hours = 5.0

[control]
max_modulation = 80.0
"#,
        );
        assert!(warnings.is_empty(), "got: {:?}", warnings);
    }

    #[test]
    fn test_no_suggestion_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_defaults_clean() {
        let (errors, warnings) = validate_physical_ranges(&SystemConfig::default());
        assert!(errors.is_empty(), "{:?}", errors);
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn test_horizon_and_modulation_ranges() {
        let mut config = SystemConfig::default();
        config.control.prediction_horizon_hours = 72;
        config.control.max_modulation = 10.0;
        let (errors, _) = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("prediction_horizon_hours")));
        assert!(errors.iter().any(|e| e.contains("max_modulation")));
    }

    #[test]
    fn test_suspicious_lag_only_warns() {
        let mut config = SystemConfig::default();
        config.model.thermal_lag_hours = 20.0;
        let (errors, warnings) = validate_physical_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.field == "model.thermal_lag_hours"));
    }

    #[test]
    fn test_non_positive_lag_is_error() {
        let mut config = SystemConfig::default();
        config.model.thermal_lag_hours = 0.0;
        let (errors, _) = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("thermal_lag_hours")));
    }
}
