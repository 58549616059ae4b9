//! Config Validation Tests
//!
//! Typo detection on raw TOML and physical range validation on the typed
//! config, exercised through the public API only.

use heatwise::config::validation::{
    known_config_keys, suggest_correction, validate_physical_ranges, validate_unknown_keys,
};
use heatwise::config::{ConfigError, SystemConfig};
use std::io::Write;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_house_section_warns_with_suggestion() {
    let toml_str = r#"
[house]
target_temprature = 21.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("target_temprature"));
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("house.target_temperature")
    );
}

#[test]
fn typo_in_control_section_warns() {
    let toml_str = r#"
[control]
max_modulaton = 80.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].suggestion.as_deref(), Some("control.max_modulation"));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[house]
target_temperature = 21.0
night_setback = 2.0
heating_system_type = "underfloor"
building_thermal_mass = "high"

[control]
prediction_horizon_hours = 24
min_runtime_minutes = 30
max_modulation = 100.0

[learning]
learning_rate = 0.1
min_samples = 50
"#;
    assert!(validate_unknown_keys(toml_str).is_empty());
}

#[test]
fn unknown_section_has_no_suggestion() {
    let warnings = validate_unknown_keys("[completely_unrelated]\nfoo = 1\n");
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|w| w.suggestion.is_none()));
}

#[test]
fn every_default_key_is_known() {
    let text = SystemConfig::default().to_toml().unwrap();
    assert!(validate_unknown_keys(&text).is_empty());
    assert!(known_config_keys().contains("control.failure_threshold"));
}

#[test]
fn suggestion_requires_close_match() {
    let known = known_config_keys();
    assert_eq!(
        suggest_correction("learning.min_sample", &known).as_deref(),
        Some("learning.min_samples")
    );
    assert!(suggest_correction("zzzzzzzzzzzz", &known).is_none());
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn defaults_pass_range_validation() {
    let (errors, _) = validate_physical_ranges(&SystemConfig::default());
    assert!(errors.is_empty(), "{errors:?}");
}

#[test]
fn horizon_outside_six_to_forty_eight_is_rejected() {
    for hours in [3, 72] {
        let mut config = SystemConfig::default();
        config.control.prediction_horizon_hours = hours;
        let (errors, _) = validate_physical_ranges(&config);
        assert!(
            errors.iter().any(|e| e.contains("prediction_horizon_hours")),
            "horizon {hours} accepted"
        );
    }
}

#[test]
fn min_runtime_and_max_modulation_bounds() {
    let mut config = SystemConfig::default();
    config.control.min_runtime_minutes = 5;
    config.control.max_modulation = 10.0;
    let (errors, _) = validate_physical_ranges(&config);
    assert!(errors.iter().any(|e| e.contains("min_runtime_minutes")));
    assert!(errors.iter().any(|e| e.contains("max_modulation")));
}

#[test]
fn learning_rate_must_be_positive() {
    let mut config = SystemConfig::default();
    config.learning.learning_rate = 0.0;
    let (errors, _) = validate_physical_ranges(&config);
    assert!(errors.iter().any(|e| e.contains("learning_rate")));
}

#[test]
fn identical_day_and_night_hours_rejected() {
    let mut config = SystemConfig::default();
    config.house.night_start_hour = 7;
    config.house.day_start_hour = 7;
    let (errors, _) = validate_physical_ranges(&config);
    assert!(errors.iter().any(|e| e.contains("night_start_hour")));
}

#[test]
fn slow_fetch_timeout_only_warns() {
    let mut config = SystemConfig::default();
    config.control.fetch_timeout_secs = config.control.tick_interval_secs;
    let (errors, warnings) = validate_physical_ranges(&config);
    assert!(errors.is_empty());
    assert!(warnings.iter().any(|w| w.field == "control.fetch_timeout_secs"));
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn out_of_range_file_fails_to_load() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[control]\nmax_modulation = 150.0").unwrap();

    match SystemConfig::load_from_file(file.path()) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("max_modulation")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn malformed_file_reports_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[house\ntarget_temperature = ").unwrap();

    let err = SystemConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(ref p, _) if p == file.path()));
}

#[test]
fn partial_file_keeps_defaults_elsewhere() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[house]\ntarget_temperature = 20.0").unwrap();

    let config = SystemConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.house.target_temperature, 20.0);
    assert_eq!(
        config.control.min_runtime_minutes,
        SystemConfig::default().control.min_runtime_minutes
    );
}
