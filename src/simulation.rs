//! Simulated house
//!
//! A first-order house with hidden "true" parameters, a deterministic
//! diurnal weather pattern and Gaussian sensor noise. It implements all
//! three collaborator traits, so the controller can run end-to-end without
//! hardware: commands change the modulation, telemetry reports the
//! resulting indoor temperature, and forecasts are the weather pattern
//! plus forecast error.

use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::pipeline::{Clock, CommandSink, ForecastSource, TelemetrySource};
use crate::thermal_model::ThermalModel;
use crate::types::weather::hours_between;
use crate::types::{Forecast, SlotDecision, Telemetry, ThermalParameters, WeatherPoint};

/// Largest integration step when advancing the house (hours).
const MAX_STEP_HOURS: f64 = 0.25;

/// Diurnal weather pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherProfile {
    /// Daily mean outdoor temperature (°C)
    pub mean_temp: f64,
    /// Half the day/night swing (K), warmest at 15:00 UTC
    pub amplitude: f64,
    /// Midday irradiance on a clear day (W/m²)
    pub peak_irradiance: f64,
    pub mean_wind: f64,
}

impl Default for WeatherProfile {
    fn default() -> Self {
        Self {
            mean_temp: 3.0,
            amplitude: 4.0,
            peak_irradiance: 450.0,
            mean_wind: 3.0,
        }
    }
}

impl WeatherProfile {
    pub fn at(&self, t: DateTime<Utc>) -> WeatherPoint {
        let hour = f64::from(t.hour()) + f64::from(t.minute()) / 60.0;
        let outdoor = self.mean_temp + self.amplitude * (2.0 * PI * (hour - 9.0) / 24.0).sin();
        let irradiance = if (6.0..18.0).contains(&hour) {
            self.peak_irradiance * (PI * (hour - 6.0) / 12.0).sin()
        } else {
            0.0
        };
        let wind = (self.mean_wind * (1.0 + 0.5 * (2.0 * PI * hour / 24.0).cos())).max(0.0);
        WeatherPoint {
            timestamp: t,
            outdoor_temp: outdoor,
            wind_speed: Some(wind),
            solar_irradiance: Some(irradiance),
            cloud_cover: None,
            humidity: None,
        }
    }
}

/// Noise levels (one standard deviation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseLevels {
    /// Indoor sensor (K)
    pub indoor: f64,
    /// Power meter (kW)
    pub power: f64,
    /// Forecast outdoor temperature error (K)
    pub forecast: f64,
}

impl Default for NoiseLevels {
    fn default() -> Self {
        Self {
            indoor: 0.05,
            power: 0.03,
            forecast: 0.5,
        }
    }
}

#[derive(Debug)]
struct HouseState {
    indoor_temp: f64,
    modulation: f64,
    updated_at: DateTime<Utc>,
    rng: StdRng,
}

pub struct SimulatedHouse {
    model: ThermalModel,
    truth: ThermalParameters,
    weather: WeatherProfile,
    noise: NoiseLevels,
    clock: Arc<dyn Clock>,
    horizon_hours: u32,
    state: Mutex<HouseState>,
}

impl SimulatedHouse {
    pub fn new(
        model: ThermalModel,
        truth: ThermalParameters,
        clock: Arc<dyn Clock>,
        initial_indoor: f64,
        seed: u64,
    ) -> Self {
        let now = clock.now();
        Self {
            model,
            truth,
            weather: WeatherProfile::default(),
            noise: NoiseLevels::default(),
            clock,
            horizon_hours: 48,
            state: Mutex::new(HouseState {
                indoor_temp: initial_indoor,
                modulation: 0.0,
                updated_at: now,
                rng: StdRng::seed_from_u64(seed),
            }),
        }
    }

    pub fn with_weather(mut self, weather: WeatherProfile) -> Self {
        self.weather = weather;
        self
    }

    pub fn with_noise(mut self, noise: NoiseLevels) -> Self {
        self.noise = noise;
        self
    }

    pub fn truth(&self) -> &ThermalParameters {
        &self.truth
    }

    /// Noise-free indoor temperature at the clock's current time.
    pub fn indoor_temp(&self) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.advance(&mut state, self.clock.now());
        state.indoor_temp
    }

    /// Integrate the house forward to `now` under the current modulation.
    fn advance(&self, state: &mut HouseState, now: DateTime<Utc>) {
        let mut remaining = hours_between(state.updated_at, now);
        let mut t = state.updated_at;
        while remaining > 1e-9 {
            let dt = remaining.min(MAX_STEP_HOURS);
            let weather = self.weather.at(t);
            state.indoor_temp = self
                .model
                .step(state.indoor_temp, &weather, dt, &self.truth, state.modulation)
                .indoor_temp;
            t += Duration::milliseconds((dt * 3_600_000.0).round() as i64);
            remaining -= dt;
        }
        if now > state.updated_at {
            state.updated_at = now;
        }
    }

    fn gaussian(rng: &mut StdRng, sigma: f64) -> f64 {
        Normal::new(0.0, sigma.max(0.0)).map_or(0.0, |n| n.sample(rng))
    }
}

#[async_trait]
impl ForecastSource for SimulatedHouse {
    async fn fetch_forecast(&self) -> Result<Forecast> {
        let now = self.clock.now();
        let start = now.duration_trunc(Duration::hours(1))?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let points = (0..=i64::from(self.horizon_hours))
            .map(|h| {
                let mut p = self.weather.at(start + Duration::hours(h));
                p.outdoor_temp += Self::gaussian(&mut state.rng, self.noise.forecast);
                p
            })
            .collect();
        Ok(Forecast::new(points)?)
    }

    fn source_name(&self) -> &str {
        "simulated-house"
    }
}

#[async_trait]
impl TelemetrySource for SimulatedHouse {
    async fn fetch_telemetry(&self) -> Result<Telemetry> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.advance(&mut state, now);

        let outdoor = self.weather.at(now).outdoor_temp;
        let heat_kw = state.modulation / 100.0 * self.model.plant().rated_output_kw;
        let power = heat_kw / self.truth.cop_curve.cop_at(outdoor);
        let indoor_noise = Self::gaussian(&mut state.rng, self.noise.indoor);
        let power_noise = Self::gaussian(&mut state.rng, self.noise.power);

        Ok(Telemetry {
            timestamp: now,
            indoor_temp: state.indoor_temp + indoor_noise,
            modulation_pct: state.modulation,
            power_kw: Some((power + power_noise).max(0.0)),
            outlet_temp: None,
            inlet_temp: None,
        })
    }

    fn source_name(&self) -> &str {
        "simulated-house"
    }
}

#[async_trait]
impl CommandSink for SimulatedHouse {
    async fn send(&self, slot: &SlotDecision) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.advance(&mut state, now);
        state.modulation = slot.modulation_pct.clamp(0.0, 100.0);
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "simulated-house"
    }
}
