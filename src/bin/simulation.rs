//! Accelerated house simulation
//!
//! Runs the full controller and learning engine against a simulated house
//! on a manual clock, so days of operation finish in seconds. Each tick is
//! printed as one JSON line; a summary follows at the end.
//!
//! # Usage
//! ```bash
//! ./simulation --hours 72 --seed 7 > run.jsonl
//! ```

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Parser;
use serde::Serialize;
use statrs::statistics::Statistics;

use heatwise::background::HealthBoard;
use heatwise::config::SystemConfig;
use heatwise::ml_engine::{LearningEngine, LearningScheduler};
use heatwise::pipeline::{
    Clock, Collaborators, ManualClock, PredictiveController, SharedState, StatusHandle,
};
use heatwise::simulation::{SimulatedHouse, WeatherProfile};
use heatwise::storage::HistoricalDataStore;
use heatwise::thermal_model::{PlantConstants, ThermalModel};
use heatwise::types::{CandidateKind, Rationale, ThermalParameters};

#[derive(Parser, Debug)]
#[command(name = "heatwise-simulation")]
#[command(about = "Accelerated closed-loop simulation of the heatwise controller")]
#[command(version)]
struct Args {
    /// Simulated duration in hours
    #[arg(short = 'H', long, default_value = "48", value_parser = clap::value_parser!(u32).range(1..=24 * 60))]
    hours: u32,

    /// Random seed for sensor and forecast noise
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Daily mean outdoor temperature (°C)
    #[arg(long, default_value = "3.0", allow_hyphen_values = true)]
    mean_temp: f64,

    /// Only print the summary
    #[arg(short, long)]
    quiet: bool,

    /// Path to a TOML config (defaults otherwise)
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[derive(Serialize)]
struct TickLine {
    time: DateTime<Utc>,
    tick: u64,
    indoor_temp: f64,
    modulation_pct: f64,
    candidate: CandidateKind,
    rationale: Option<Rationale>,
    learning_version: u64,
}

#[derive(Serialize)]
struct Summary {
    hours: u32,
    ticks: u64,
    holds: u64,
    mean_indoor_temp: f64,
    min_indoor_temp: f64,
    energy_kwh: f64,
    learning_version: u64,
    confidence: f64,
    learned: ThermalParameters,
    truth: ThermalParameters,
}

fn hidden_truth(config: &SystemConfig) -> ThermalParameters {
    let mut truth = config.prior_parameters();
    truth.thermal_lag_hours *= 1.25;
    truth.solar_gain_factor = (truth.solar_gain_factor * 1.3).min(1.0);
    truth.clamped()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SystemConfig::load_from_file(path)?,
        None => SystemConfig::default(),
    };

    let start = Utc
        .with_ymd_and_hms(2024, 1, 15, 0, 0, 0)
        .single()
        .ok_or_else(|| anyhow::anyhow!("invalid start time"))?;
    let clock = Arc::new(ManualClock::new(start));
    let dyn_clock: Arc<dyn Clock> = clock.clone();

    let plant = PlantConstants::from(&config.model);
    let model = ThermalModel::new(plant);
    let truth = hidden_truth(&config);
    let weather = WeatherProfile {
        mean_temp: args.mean_temp,
        ..WeatherProfile::default()
    };
    let house = Arc::new(
        SimulatedHouse::new(
            model,
            truth.clone(),
            Arc::clone(&dyn_clock),
            config.house.target_temperature - 1.0,
            args.seed,
        )
        .with_weather(weather),
    );

    let engine = Arc::new(LearningEngine::new(
        config.learning.clone(),
        plant,
        config.prior_parameters(),
    ));
    let history = Arc::new(HistoricalDataStore::in_memory(config.learning.history_capacity));
    let status = Arc::new(StatusHandle::new(start));
    let health = Arc::new(HealthBoard::new());

    let mut controller = PredictiveController::new(
        &config,
        model,
        Collaborators {
            forecast: house.clone(),
            telemetry: house.clone(),
            sink: house.clone(),
        },
        SharedState {
            engine: Arc::clone(&engine),
            history: Arc::clone(&history),
            status: Arc::clone(&status),
            health,
        },
    );
    let mut scheduler = LearningScheduler::new(
        &config.learning,
        Arc::clone(&engine),
        Arc::clone(&history),
        status,
        dyn_clock,
    );

    let tick = Duration::seconds(i64::try_from(config.control.tick_interval_secs)?);
    let end = start + Duration::hours(i64::from(args.hours));
    let tick_hours = config.control.tick_interval_secs as f64 / 3600.0;

    let mut temps = Vec::new();
    let mut energy_kwh = 0.0;
    let mut holds = 0u64;
    let mut ticks = 0u64;

    while clock.now() < end {
        let report = controller.tick(clock.now()).await;
        ticks += 1;
        if report.decision.is_hold() {
            holds += 1;
        }
        let indoor = house.indoor_temp();
        temps.push(indoor);
        let modulation = report.modulation();
        let heat_kw = modulation / 100.0 * plant.rated_output_kw;
        let outdoor = weather.at(clock.now()).outdoor_temp;
        energy_kwh += heat_kw / truth.cop_curve.cop_at(outdoor) * tick_hours;

        if !args.quiet {
            let line = TickLine {
                time: clock.now(),
                tick: report.tick,
                indoor_temp: indoor,
                modulation_pct: modulation,
                candidate: report.decision.candidate,
                rationale: report.decision.current().map(|s| s.rationale),
                learning_version: report.decision.learning_version,
            };
            println!("{}", serde_json::to_string(&line)?);
        }

        if let Some(retrain) = scheduler.run_once().await? {
            tracing::info!(outcome = ?retrain.outcome, "retrain");
        }
        clock.advance(tick);
    }

    let learned = engine.snapshot();
    let summary = Summary {
        hours: args.hours,
        ticks,
        holds,
        mean_indoor_temp: temps.iter().copied().mean(),
        min_indoor_temp: temps.iter().copied().fold(f64::INFINITY, f64::min),
        energy_kwh,
        learning_version: learned.version,
        confidence: learned.confidence_score,
        learned: learned.params.clone(),
        truth,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
