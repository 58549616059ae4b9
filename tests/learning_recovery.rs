//! Restart recovery
//!
//! A crash mid-append leaves a torn last line in the history journal; the
//! next start must drop it, keep everything before it, and retrain from
//! what survived. Learning state persisted in sled must come back as the
//! newest version.

use std::io::Write;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use heatwise::background::{HealthBoard, HealthSignal};
use heatwise::config::SystemConfig;
use heatwise::ml_engine::{LearningEngine, LearningStateStore, RetrainOutcome};
use heatwise::startup::{open_data_stores, restore_learning_state, HISTORY_COMPONENT};
use heatwise::storage::{HistoricalDataStore, HISTORY_JOURNAL_FILE, LEARNING_DB_DIR};
use heatwise::thermal_model::{PlantConstants, ThermalModel};
use heatwise::types::{BuildingMass, CopCurve, ObservationRecord, ThermalParameters, WeatherPoint};

fn make_truth() -> ThermalParameters {
    ThermalParameters {
        thermal_lag_hours: 6.0,
        solar_gain_factor: 0.3,
        wind_factor: 0.1,
        building_thermal_mass: BuildingMass::Medium,
        cop_curve: CopCurve::constant(3.0),
    }
}

fn history_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Quarter-hourly history produced by the model with known parameters.
fn make_history(n: usize) -> Vec<ObservationRecord> {
    let model = ThermalModel::default();
    let truth = make_truth();
    let mut rng = StdRng::seed_from_u64(11);
    let dt = 0.25;
    let mut indoor = 20.0;
    let mut modulation = 30.0;

    (0..n)
        .map(|i| {
            if i % 6 == 0 {
                modulation = rng.gen_range(10.0..60.0);
            }
            let hour = i as f64 * dt;
            let weather = WeatherPoint {
                wind_speed: Some(rng.gen_range(0.0..6.0)),
                solar_irradiance: Some((300.0 * (hour / 24.0 * std::f64::consts::TAU).sin()).max(0.0)),
                ..WeatherPoint::calm(history_start(), 4.0 + 5.0 * (hour / 17.0).sin())
            };
            let out = model.step(indoor, &weather, dt, &truth, modulation);
            let record = ObservationRecord {
                timestamp: history_start() + Duration::minutes(15 * (i as i64 + 1)),
                indoor_temp: out.indoor_temp,
                prior_indoor_temp: indoor,
                predicted_indoor_temp: out.indoor_temp,
                outdoor_temp: weather.outdoor_temp,
                wind_speed: weather.wind_speed,
                solar_irradiance: weather.solar_irradiance,
                target_temp: 21.0,
                heat_pump_modulation_pct: modulation,
                measured_power: Some(out.energy_kwh / dt),
                derived_cop: Some(out.heat_kwh / out.energy_kwh),
                interval_hours: dt,
            };
            indoor = out.indoor_temp;
            record
        })
        .collect()
}

fn make_engine(config: &SystemConfig) -> LearningEngine {
    LearningEngine::new(
        config.learning.clone(),
        PlantConstants::from(&config.model),
        config.prior_parameters(),
    )
}

#[test]
fn torn_journal_tail_is_dropped_and_history_retrains() {
    let dir = tempfile::tempdir().unwrap();
    let config = SystemConfig::default();
    let records = make_history(600);

    {
        let (store, recovery) =
            HistoricalDataStore::open(dir.path().join(HISTORY_JOURNAL_FILE), 10_000).unwrap();
        assert!(recovery.is_clean());
        for record in records.iter().cloned() {
            store.append(record).unwrap();
        }
    }

    // simulate a crash halfway through writing the next record
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(dir.path().join(HISTORY_JOURNAL_FILE))
        .unwrap();
    file.write_all(br#"{"timestamp":"2024-01-05T04:15:00Z","indoor_te"#).unwrap();
    drop(file);

    let health = HealthBoard::new();
    let now = records.last().unwrap().timestamp + Duration::hours(1);
    let stores = open_data_stores(dir.path(), 10_000, &health, now).unwrap();

    assert_eq!(stores.history.len(), 600);
    assert_eq!(stores.history.latest().unwrap().timestamp, records[599].timestamp);
    let corruption: Vec<_> = health
        .events()
        .into_iter()
        .filter(|e| matches!(&e.signal, HealthSignal::PersistenceCorruption { component, .. } if component == HISTORY_COMPONENT))
        .collect();
    assert_eq!(corruption.len(), 1);

    let engine = make_engine(&config);
    let report = engine.retrain(&stores.history.snapshot(), now);
    assert!(report.outcome.is_updated(), "{:?}", report.outcome);
    assert_eq!(report.state.sample_count, 600);

    // appends continue cleanly after the truncated tail
    let next = ObservationRecord {
        timestamp: now,
        ..records[599].clone()
    };
    stores.history.append(next).unwrap();
    drop(stores);

    let (reopened, recovery) =
        HistoricalDataStore::open(dir.path().join(HISTORY_JOURNAL_FILE), 10_000).unwrap();
    assert!(recovery.is_clean());
    assert_eq!(reopened.len(), 601);
}

#[test]
fn learning_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = SystemConfig::default();
    let records = make_history(600);
    let now = records.last().unwrap().timestamp + Duration::hours(1);

    let trained_params = {
        let store = LearningStateStore::open(dir.path().join(LEARNING_DB_DIR)).unwrap();
        let engine = make_engine(&config);
        let report = engine.retrain(&records, now);
        assert!(report.outcome.is_updated());
        store.store(&report.state).unwrap();
        report.state.params.clone()
    };

    let health = HealthBoard::new();
    let stores = open_data_stores(dir.path(), 10_000, &health, now).unwrap();
    let engine = make_engine(&config);
    assert!(engine.snapshot().is_prior());

    let restored = restore_learning_state(&engine, &stores.learning, &health, now);
    assert_eq!(restored, Some(1));
    let params = &engine.snapshot().params;
    assert!((params.thermal_lag_hours - trained_params.thermal_lag_hours).abs() < 1e-9);
    assert!((params.solar_gain_factor - trained_params.solar_gain_factor).abs() < 1e-9);
    assert!((params.wind_factor - trained_params.wind_factor).abs() < 1e-9);
    assert!(health.events().is_empty());
}

#[test]
fn short_history_keeps_prior_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = SystemConfig::default();
    let records = make_history(20);
    {
        let (store, _) =
            HistoricalDataStore::open(dir.path().join(HISTORY_JOURNAL_FILE), 10_000).unwrap();
        for record in records.iter().cloned() {
            store.append(record).unwrap();
        }
    }

    let health = HealthBoard::new();
    let now = records.last().unwrap().timestamp;
    let stores = open_data_stores(dir.path(), 10_000, &health, now).unwrap();
    let engine = make_engine(&config);
    let report = engine.retrain(&stores.history.snapshot(), now);

    assert!(matches!(
        report.outcome,
        RetrainOutcome::InsufficientHistory { valid: 20, .. }
    ));
    assert_eq!(report.state.confidence_score, 0.0);
    assert_eq!(engine.snapshot().params, config.prior_parameters());
}

#[test]
fn restored_state_without_history_falls_back_to_prior() {
    let dir = tempfile::tempdir().unwrap();
    let config = SystemConfig::default();
    let records = make_history(600);
    let now = records.last().unwrap().timestamp + Duration::hours(1);

    {
        let store = LearningStateStore::open(dir.path().join(LEARNING_DB_DIR)).unwrap();
        let report = make_engine(&config).retrain(&records, now);
        assert!(report.outcome.is_updated());
        store.store(&report.state).unwrap();
    }

    // the journal is gone, only the learned state survived
    let health = HealthBoard::new();
    let stores = open_data_stores(dir.path(), 10_000, &health, now).unwrap();
    assert_eq!(stores.history.len(), 0);
    let engine = make_engine(&config);
    assert_eq!(restore_learning_state(&engine, &stores.learning, &health, now), Some(1));
    assert!(engine.snapshot().confidence_score > 0.0);

    let report = engine.retrain(&stores.history.snapshot(), now);
    assert!(matches!(
        report.outcome,
        RetrainOutcome::InsufficientHistory { valid: 0, .. }
    ));
    assert!(report.published);
    assert_eq!(report.state.version, 2);
    assert_eq!(report.state.confidence_score, 0.0);
    assert_eq!(&report.state.params, engine.prior());
    assert_eq!(engine.snapshot().params, *engine.prior());
}
