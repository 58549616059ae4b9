//! Predictive Controller - one control tick
//!
//! ```text
//! FETCH    forecast + telemetry, each under a timeout, cached fallback
//! PREDICT  candidates simulated over the horizon
//! DECIDE   constrained, lowest-cost schedule (or a hold when inputs are gone)
//! COMMIT   current slot to the command sink
//! OBSERVE  previous tick's prediction vs. this tick's reading -> history
//! ```
//!
//! A tick never fails outright. Missing inputs degrade it to a hold
//! decision, and repeated degradation is reported through the health
//! board, not by stopping the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::source::{CommandSink, ForecastSource, TelemetrySource};
use super::state::{LoopStatus, StatusHandle};
use crate::background::{HealthBoard, HealthSignal, TickFailureTracker};
use crate::config::SystemConfig;
use crate::ml_engine::LearningEngine;
use crate::optimization::{align_to_now, is_off, PlanInputs, ScheduleOptimizer};
use crate::storage::{HistoricalDataStore, StoreError};
use crate::thermal_model::ThermalModel;
use crate::types::weather::hours_between;
use crate::types::{
    CandidateKind, ControlDecision, DataUnavailable, Forecast, ForecastSlot, ObservationRecord, Rationale,
    SlotDecision, Telemetry, ThermalParameters, WeatherPoint,
};

/// Power below this is treated as unmeasured when deriving COP (kW).
const MIN_MEASURED_POWER_KW: f64 = 0.05;

/// The three collaborators a controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub forecast: Arc<dyn ForecastSource>,
    pub telemetry: Arc<dyn TelemetrySource>,
    pub sink: Arc<dyn CommandSink>,
}

/// Shared handles owned outside the controller.
#[derive(Clone)]
pub struct SharedState {
    pub engine: Arc<LearningEngine>,
    pub history: Arc<HistoricalDataStore>,
    pub status: Arc<StatusHandle>,
    pub health: Arc<HealthBoard>,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub decision: Arc<ControlDecision>,
    /// The current slot reached the command sink
    pub committed: bool,
    pub health_signal: Option<HealthSignal>,
    pub observation: Option<ObservationRecord>,
}

impl TickReport {
    pub fn modulation(&self) -> f64 {
        self.decision.current().map_or(0.0, |s| s.modulation_pct)
    }
}

/// What was committed last tick, kept until the next reading closes it.
#[derive(Debug, Clone)]
struct PendingObservation {
    reading_at: DateTime<Utc>,
    indoor_temp: f64,
    weather: WeatherPoint,
    setpoint: f64,
    modulation: f64,
    params: ThermalParameters,
}

#[derive(Debug, Default)]
struct InputCache {
    forecast: Option<(Forecast, DateTime<Utc>)>,
    telemetry: Option<Telemetry>,
}

/// Inputs as resolved by the fetch stage.
struct Fetched {
    forecast: Option<Forecast>,
    telemetry: Option<Telemetry>,
    /// The reading came from this tick's fetch, not the cache
    fresh_telemetry: bool,
    failure: Option<DataUnavailable>,
}

pub struct PredictiveController {
    optimizer: ScheduleOptimizer,
    horizon_hours: u32,
    tick_interval: Duration,
    fetch_timeout: Duration,
    staleness_limit: chrono::Duration,
    io: Collaborators,
    shared: SharedState,
    failures: TickFailureTracker,
    cache: InputCache,
    pending: Option<PendingObservation>,
    ticks: u64,
    last_committed: Option<f64>,
    running_since: Option<DateTime<Utc>>,
    observations_recorded: u64,
    last_commit_error: Option<String>,
}

impl PredictiveController {
    pub fn new(config: &SystemConfig, model: ThermalModel, io: Collaborators, shared: SharedState) -> Self {
        let control = &config.control;
        Self {
            optimizer: ScheduleOptimizer::new(model, config),
            horizon_hours: control.prediction_horizon_hours,
            tick_interval: control.tick_interval(),
            fetch_timeout: control.fetch_timeout(),
            staleness_limit: control.staleness_limit(),
            io,
            shared,
            failures: TickFailureTracker::new(control.failure_threshold),
            cache: InputCache::default(),
            pending: None,
            ticks: 0,
            last_committed: None,
            running_since: None,
            observations_recorded: 0,
            last_commit_error: None,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn last_committed_modulation(&self) -> Option<f64> {
        self.last_committed
    }

    /// Run one full tick at `now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        self.ticks += 1;
        let tick = self.ticks;

        // FETCH
        let fetched = self.fetch(now).await;
        let health_signal = self.track_health(now, fetched.failure.as_ref());

        // PREDICT + DECIDE
        let decision = match (&fetched.forecast, &fetched.telemetry) {
            (Some(forecast), Some(telemetry)) => self
                .decide(now, tick, forecast, telemetry, fetched.failure.clone())
                .unwrap_or_else(|| {
                    let reason = DataUnavailable::Forecast("forecast does not cover now".to_string());
                    self.hold(now, tick, reason, Some(telemetry))
                }),
            _ => {
                let reason = fetched
                    .failure
                    .clone()
                    .unwrap_or_else(|| DataUnavailable::Both("no inputs received yet".to_string()));
                self.hold(now, tick, reason, fetched.telemetry.as_ref())
            }
        };
        let decision = Arc::new(decision);

        // COMMIT
        let committed = self.commit(now, &decision).await;

        // OBSERVE
        let observation = if fetched.fresh_telemetry {
            fetched.telemetry.and_then(|t| self.observe(&t))
        } else {
            None
        };
        self.pending = if committed && fetched.fresh_telemetry && !decision.is_hold() {
            self.next_pending(&decision, fetched.telemetry.as_ref(), fetched.forecast.as_ref(), now)
        } else {
            None
        };

        self.publish(now, &decision, &fetched);

        match decision.current() {
            Some(slot) => info!(
                tick,
                candidate = %decision.candidate,
                modulation = slot.modulation_pct,
                setpoint = slot.target_setpoint,
                rationale = %slot.rationale,
                cost = decision.cost,
                "[ControlLoop] Tick complete"
            ),
            None => warn!(tick, "[ControlLoop] Tick produced an empty decision"),
        }

        TickReport {
            tick,
            decision,
            committed,
            health_signal,
            observation,
        }
    }

    // ========================================================================
    // FETCH
    // ========================================================================

    async fn fetch(&mut self, now: DateTime<Utc>) -> Fetched {
        let (forecast_res, telemetry_res) = tokio::join!(
            tokio::time::timeout(self.fetch_timeout, self.io.forecast.fetch_forecast()),
            tokio::time::timeout(self.fetch_timeout, self.io.telemetry.fetch_telemetry()),
        );
        let timeout_secs = self.fetch_timeout.as_secs();

        let forecast_res = match forecast_res {
            Ok(Ok(f)) if f.slots_from(now, self.horizon_hours).is_empty() => {
                Err("forecast ends before now".to_string())
            }
            Ok(Ok(f)) => Ok(f),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(format!("timed out after {}s", timeout_secs)),
        };
        let telemetry_res = match telemetry_res {
            Ok(Ok(t)) if now - t.timestamp > self.staleness_limit => Err(format!(
                "reading from {} is older than {}s",
                t.timestamp,
                self.staleness_limit.num_seconds()
            )),
            Ok(Ok(t)) if !t.indoor_temp.is_finite() || !t.modulation_pct.is_finite() => {
                Err("reading has non-finite values".to_string())
            }
            Ok(Ok(t)) => Ok(t),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(format!("timed out after {}s", timeout_secs)),
        };

        let forecast_err = forecast_res.as_ref().err().cloned();
        let telemetry_err = telemetry_res.as_ref().err().cloned();

        let forecast = match forecast_res {
            Ok(f) => {
                self.cache.forecast = Some((f.clone(), now));
                Some(f)
            }
            Err(e) => {
                warn!(source = self.io.forecast.source_name(), error = %e, "[ControlLoop] Forecast fetch failed");
                self.cache
                    .forecast
                    .as_ref()
                    .filter(|(_, at)| now - *at <= self.staleness_limit)
                    .map(|(f, _)| f.clone())
            }
        };

        let fresh_telemetry = telemetry_res.is_ok();
        let telemetry = match telemetry_res {
            Ok(t) => {
                self.cache.telemetry = Some(t);
                Some(t)
            }
            Err(e) => {
                warn!(source = self.io.telemetry.source_name(), error = %e, "[ControlLoop] Telemetry fetch failed");
                self.cache
                    .telemetry
                    .filter(|t| now - t.timestamp <= self.staleness_limit)
            }
        };

        let failure = match (forecast_err, telemetry_err) {
            (None, None) => None,
            (Some(f), None) => Some(DataUnavailable::Forecast(f)),
            (None, Some(t)) => Some(DataUnavailable::Telemetry(t)),
            (Some(f), Some(t)) => Some(DataUnavailable::Both(format!("forecast: {}; telemetry: {}", f, t))),
        };

        Fetched {
            forecast,
            telemetry,
            fresh_telemetry,
            failure,
        }
    }

    /// Any fetch failure counts toward the failure streak, even when the
    /// cache covered it.
    fn track_health(&mut self, now: DateTime<Utc>, failure: Option<&DataUnavailable>) -> Option<HealthSignal> {
        let signal = match failure {
            Some(reason) => self.failures.record_failure(&reason.to_string()),
            None => self.failures.record_success(),
        };
        self.shared
            .health
            .set_degraded_inputs(failure.map(ToString::to_string));
        if let Some(ref s) = signal {
            self.shared.health.emit(s.clone(), now);
        }
        signal
    }

    // ========================================================================
    // PREDICT + DECIDE
    // ========================================================================

    fn decide(
        &self,
        now: DateTime<Utc>,
        tick: u64,
        forecast: &Forecast,
        telemetry: &Telemetry,
        degraded: Option<DataUnavailable>,
    ) -> Option<ControlDecision> {
        let learning = self.shared.engine.snapshot();
        let slots = align_to_now(now, &forecast.slots_from(now, self.horizon_hours));

        let inputs = PlanInputs {
            now,
            indoor_temp: telemetry.indoor_temp,
            slots: &slots,
            params: &learning.params,
            current_modulation: self.last_committed.unwrap_or(telemetry.modulation_pct),
            running_since: self.running_since,
        };
        let best = self.optimizer.optimize(&inputs)?;
        debug!(
            tick,
            candidate = %best.kind,
            cost = best.cost.total,
            energy_kwh = best.cost.energy_kwh,
            comfort_penalty = best.cost.comfort_penalty,
            changes = best.changes,
            "[ControlLoop] Candidate selected"
        );

        Some(ControlDecision {
            issued_at: now,
            tick,
            candidate: best.kind,
            cost: best.cost.total,
            learning_version: learning.version,
            slots: best.slots,
            degraded,
        })
    }

    /// Keep the heat pump where it is for one tick interval.
    ///
    /// That is the last committed modulation, or before the first commit the
    /// modulation the heat pump last reported. Off only when neither exists.
    fn hold(
        &self,
        now: DateTime<Utc>,
        tick: u64,
        reason: DataUnavailable,
        telemetry: Option<&Telemetry>,
    ) -> ControlDecision {
        warn!(tick, reason = %reason, "[ControlLoop] No usable inputs, holding state");
        let reference = self.optimizer.comfort().reference(now);
        let reading = telemetry.or(self.cache.telemetry.as_ref());
        let indoor = reading.map_or(reference, |t| t.indoor_temp);
        let modulation = self
            .last_committed
            .or_else(|| reading.map(|t| t.modulation_pct))
            .unwrap_or(0.0);
        ControlDecision {
            issued_at: now,
            tick,
            candidate: CandidateKind::Hold,
            cost: 0.0,
            learning_version: self.shared.engine.version(),
            slots: vec![SlotDecision {
                start: now,
                duration_hours: self.tick_interval.as_secs_f64() / 3600.0,
                target_setpoint: reference,
                modulation_pct: modulation,
                rationale: Rationale::Degraded,
                predicted_indoor_temp: indoor,
                predicted_energy_kwh: 0.0,
                low_confidence: true,
            }],
            degraded: Some(reason),
        }
    }

    // ========================================================================
    // COMMIT
    // ========================================================================

    async fn commit(&mut self, now: DateTime<Utc>, decision: &ControlDecision) -> bool {
        let Some(slot) = decision.current() else {
            return false;
        };
        let sent = tokio::time::timeout(self.fetch_timeout, self.io.sink.send(slot)).await;
        let error = match sent {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(_) => Some(format!("timed out after {}s", self.fetch_timeout.as_secs())),
        };
        if let Some(e) = error {
            error!(sink = self.io.sink.sink_name(), error = %e, "[ControlLoop] Command not delivered");
            self.last_commit_error = Some(e);
            return false;
        }

        let m = slot.modulation_pct;
        let was_off = self.last_committed.map_or(true, is_off);
        if is_off(m) {
            self.running_since = None;
        } else if was_off || self.running_since.is_none() {
            self.running_since = Some(now);
        }
        self.last_committed = Some(m);
        self.last_commit_error = None;
        true
    }

    // ========================================================================
    // OBSERVE
    // ========================================================================

    /// Close the previous tick's pending prediction against `reading`.
    fn observe(&mut self, reading: &Telemetry) -> Option<ObservationRecord> {
        let pending = self.pending.as_ref()?;
        if reading.timestamp <= pending.reading_at {
            return None;
        }
        let interval_hours = hours_between(pending.reading_at, reading.timestamp);
        let model = self.optimizer.model();
        let predicted = model.step(pending.indoor_temp, &pending.weather, interval_hours, &pending.params, pending.modulation);

        let measured_power = reading.power_kw.filter(|p| p.is_finite());
        let heat_kw = pending.modulation.clamp(0.0, 100.0) / 100.0 * model.plant().rated_output_kw;
        let derived_cop = measured_power
            .filter(|&p| p > MIN_MEASURED_POWER_KW && heat_kw > 0.0)
            .map(|p| heat_kw / p);

        let record = ObservationRecord {
            timestamp: reading.timestamp,
            indoor_temp: reading.indoor_temp,
            prior_indoor_temp: pending.indoor_temp,
            predicted_indoor_temp: predicted.indoor_temp,
            outdoor_temp: pending.weather.outdoor_temp,
            wind_speed: pending.weather.wind_speed,
            solar_irradiance: pending.weather.solar_irradiance,
            target_temp: pending.setpoint,
            heat_pump_modulation_pct: pending.modulation,
            measured_power,
            derived_cop,
            interval_hours,
        };

        match self.shared.history.append(record.clone()) {
            Ok(()) => {}
            Err(e @ StoreError::OutOfOrder { .. }) => {
                warn!(error = %e, "[ControlLoop] Observation rejected");
                return None;
            }
            Err(e) => error!(error = %e, "[ControlLoop] Observation not persisted"),
        }
        self.observations_recorded += 1;
        debug!(
            error_k = record.prediction_error(),
            interval_hours,
            "[ControlLoop] Observation recorded"
        );
        Some(record)
    }

    fn next_pending(
        &self,
        decision: &ControlDecision,
        reading: Option<&Telemetry>,
        forecast: Option<&Forecast>,
        now: DateTime<Utc>,
    ) -> Option<PendingObservation> {
        let reading = reading?;
        let slot = decision.current()?;
        let weather = forecast
            .and_then(|f| current_slot(f, now, self.horizon_hours))
            .map(|s| s.weather)?;
        Some(PendingObservation {
            reading_at: reading.timestamp,
            indoor_temp: reading.indoor_temp,
            weather,
            setpoint: slot.target_setpoint,
            modulation: slot.modulation_pct,
            params: self.shared.engine.snapshot().params.clone(),
        })
    }

    fn publish(&self, now: DateTime<Utc>, decision: &Arc<ControlDecision>, fetched: &Fetched) {
        self.shared.status.publish_decision(Arc::clone(decision));
        self.shared.status.publish_loop_status(LoopStatus {
            ticks: self.ticks,
            last_tick_at: Some(now),
            last_committed_modulation: self.last_committed,
            running_since: self.running_since,
            consecutive_failures: self.failures.consecutive(),
            degraded: fetched.failure.clone(),
            last_telemetry: self.cache.telemetry,
            last_commit_error: self.last_commit_error.clone(),
            observations_recorded: self.observations_recorded,
        });
    }
}

/// The slot in force at `now` (or the next one, across a forecast gap).
fn current_slot(forecast: &Forecast, now: DateTime<Utc>, horizon_hours: u32) -> Option<ForecastSlot> {
    forecast.slots_from(now, horizon_hours).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::HealthStatus;
    use crate::config::SystemConfig;
    use crate::ml_engine::LearningEngine;
    use crate::pipeline::clock::{Clock, ManualClock};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct FixedForecast(Forecast);

    #[async_trait]
    impl ForecastSource for FixedForecast {
        async fn fetch_forecast(&self) -> Result<Forecast> {
            Ok(self.0.clone())
        }
        fn source_name(&self) -> &str {
            "fixed"
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Fetch {
        Ok,
        Fail,
        /// Answers only after an hour
        Slow,
    }

    /// Plays a script of fetch outcomes, then answers normally.
    struct ScriptedForecast {
        forecast: Forecast,
        script: Mutex<Vec<Fetch>>,
    }

    #[async_trait]
    impl ForecastSource for ScriptedForecast {
        async fn fetch_forecast(&self) -> Result<Forecast> {
            let step = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() { Fetch::Ok } else { script.remove(0) }
            };
            match step {
                Fetch::Ok => Ok(self.forecast.clone()),
                Fetch::Fail => Err(anyhow!("weather service unreachable")),
                Fetch::Slow => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(self.forecast.clone())
                }
            }
        }
        fn source_name(&self) -> &str {
            "scripted"
        }
    }

    /// Reads the indoor temperature from a script; `None` entries fail.
    struct ScriptedTelemetry {
        clock: Arc<ManualClock>,
        script: Mutex<Vec<Option<f64>>>,
    }

    #[async_trait]
    impl TelemetrySource for ScriptedTelemetry {
        async fn fetch_telemetry(&self) -> Result<Telemetry> {
            let next = self.script.lock().unwrap().remove(0);
            let indoor_temp = next.ok_or_else(|| anyhow!("sensor offline"))?;
            Ok(Telemetry {
                timestamp: self.clock.now(),
                indoor_temp,
                modulation_pct: 40.0,
                power_kw: Some(1.5),
                outlet_temp: None,
                inlet_temp: None,
            })
        }
        fn source_name(&self) -> &str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<SlotDecision>>);

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn send(&self, slot: &SlotDecision) -> Result<()> {
            self.0.lock().unwrap().push(slot.clone());
            Ok(())
        }
        fn sink_name(&self) -> &str {
            "recording"
        }
    }

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap()
    }

    fn flat_forecast() -> Forecast {
        let points = (0..48)
            .map(|i| WeatherPoint::calm(start_time() + chrono::Duration::hours(i), 5.0))
            .collect();
        Forecast::new(points).unwrap()
    }

    fn make_controller(
        script: Vec<Option<f64>>,
    ) -> (PredictiveController, Arc<ManualClock>, Arc<RecordingSink>, SharedState) {
        make_controller_with(Arc::new(FixedForecast(flat_forecast())), script)
    }

    fn make_controller_with(
        forecast: Arc<dyn ForecastSource>,
        script: Vec<Option<f64>>,
    ) -> (PredictiveController, Arc<ManualClock>, Arc<RecordingSink>, SharedState) {
        let start = start_time();
        let clock = Arc::new(ManualClock::new(start));
        let mut config = SystemConfig::default();
        config.house.night_setback = 0.0;

        let sink = Arc::new(RecordingSink::default());
        let io = Collaborators {
            forecast,
            telemetry: Arc::new(ScriptedTelemetry {
                clock: Arc::clone(&clock),
                script: Mutex::new(script),
            }),
            sink: sink.clone(),
        };
        let shared = SharedState {
            engine: Arc::new(LearningEngine::new(
                config.learning.clone(),
                Default::default(),
                config.prior_parameters(),
            )),
            history: Arc::new(HistoricalDataStore::in_memory(100)),
            status: Arc::new(StatusHandle::new(start)),
            health: Arc::new(HealthBoard::new()),
        };
        let controller = PredictiveController::new(&config, ThermalModel::default(), io, shared.clone());
        (controller, clock, sink, shared)
    }

    fn scripted_forecast(script: Vec<Fetch>) -> Arc<ScriptedForecast> {
        Arc::new(ScriptedForecast {
            forecast: flat_forecast(),
            script: Mutex::new(script),
        })
    }

    #[tokio::test]
    async fn test_good_ticks_commit_and_observe() {
        let (mut controller, clock, sink, shared) = make_controller(vec![Some(21.0), Some(20.9)]);

        let first = controller.tick(clock.now()).await;
        assert!(first.committed);
        assert_eq!(first.decision.candidate, CandidateKind::Maintain);
        assert!(first.modulation() > 0.0);
        assert!(first.observation.is_none());

        clock.advance(chrono::Duration::minutes(5));
        let second = controller.tick(clock.now()).await;
        let obs = second.observation.expect("second tick closes the first prediction");
        assert!((obs.interval_hours - 5.0 / 60.0).abs() < 1e-9);
        assert_eq!(obs.prior_indoor_temp, 21.0);
        assert_eq!(shared.history.len(), 1);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
        assert!(shared.status.decision().is_some());
    }

    #[tokio::test]
    async fn test_missing_telemetry_holds_and_raises_once() {
        let script = vec![Some(21.0), None, None, None, None];
        let (mut controller, clock, _sink, shared) = make_controller(script);

        let first = controller.tick(clock.now()).await;
        let committed = first.modulation();

        let mut signals = 0;
        let mut last = first;
        for _ in 0..4 {
            // longer than the staleness limit so the cache cannot cover it
            clock.advance(chrono::Duration::minutes(15));
            last = controller.tick(clock.now()).await;
            if last.health_signal.as_ref().is_some_and(HealthSignal::is_tick_failure) {
                signals += 1;
            }
        }
        assert_eq!(signals, 1);
        assert!(last.decision.is_hold());
        assert_eq!(last.decision.slots[0].rationale, Rationale::Degraded);
        assert_eq!(last.modulation(), committed);
        assert!(matches!(shared.health.status(), HealthStatus::Unhealthy { .. }));
    }

    #[tokio::test]
    async fn test_first_tick_hold_keeps_reported_modulation() {
        let forecast = scripted_forecast(vec![Fetch::Fail]);
        let (mut controller, clock, sink, _shared) = make_controller_with(forecast, vec![Some(21.0)]);

        let report = controller.tick(clock.now()).await;
        assert!(report.decision.is_hold());
        assert!(report.committed);
        assert_eq!(report.modulation(), 40.0);
        assert_eq!(report.decision.slots[0].rationale, Rationale::Degraded);
        assert_eq!(sink.0.lock().unwrap()[0].modulation_pct, 40.0);
        assert_eq!(controller.last_committed_modulation(), Some(40.0));
    }

    #[tokio::test]
    async fn test_cached_forecast_covers_one_failed_fetch() {
        let forecast = scripted_forecast(vec![Fetch::Ok, Fetch::Fail]);
        let (mut controller, clock, _sink, shared) =
            make_controller_with(forecast, vec![Some(21.0), Some(21.0), Some(21.0)]);

        controller.tick(clock.now()).await;
        // inside the staleness window
        clock.advance(chrono::Duration::minutes(5));
        let covered = controller.tick(clock.now()).await;

        assert!(!covered.decision.is_hold());
        assert!(matches!(covered.decision.degraded, Some(DataUnavailable::Forecast(_))));
        assert!(covered.committed);
        assert!(covered.health_signal.is_none());
        assert_eq!(shared.status.loop_status().consecutive_failures, 1);

        clock.advance(chrono::Duration::minutes(5));
        let clean = controller.tick(clock.now()).await;
        assert!(clean.decision.degraded.is_none());
        assert_eq!(shared.status.loop_status().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_forecast_times_out() {
        let forecast = scripted_forecast(vec![Fetch::Ok, Fetch::Slow]);
        let (mut controller, clock, _sink, shared) =
            make_controller_with(forecast, vec![Some(21.0), Some(21.0)]);

        controller.tick(clock.now()).await;
        clock.advance(chrono::Duration::minutes(5));
        let report = controller.tick(clock.now()).await;

        match &report.decision.degraded {
            Some(DataUnavailable::Forecast(reason)) => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("expected a forecast timeout, got {other:?}"),
        }
        // the cached forecast still plans the tick
        assert!(!report.decision.is_hold());
        assert_eq!(shared.status.loop_status().consecutive_failures, 1);
    }
}
