//! Thermal Model - first-order building response
//!
//! Pure functions over (conditions, parameters, modulation). The indoor
//! temperature relaxes exponentially toward an equilibrium set by heat-pump
//! injection, passive solar gain and wind-dependent envelope loss:
//!
//! ```text
//! G    = 1 + wind_factor * wind_speed
//! T_eq = T_out + (H + S) / G
//! T'   = T_eq + (T - T_eq) * exp(-dt / thermal_lag)
//! ```
//!
//! `H` is the modulation's share of `heating_capacity_k` and `S` is
//! `solar_gain_factor * irradiance / solar_reference`. Each slot is one
//! closed-form step, so identical inputs always give identical outputs.

use serde::Serialize;

use crate::config::ModelConfig;
use crate::types::{ForecastSlot, ThermalParameters, WeatherPoint};

/// Plant constants that do not change with learning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantConstants {
    /// Equilibrium rise above outdoor at 100 % modulation (K)
    pub heating_capacity_k: f64,
    /// Thermal output at 100 % modulation (kW)
    pub rated_output_kw: f64,
    /// Irradiance producing 1 K per unit of solar gain factor (W/m²)
    pub solar_reference_w_m2: f64,
}

impl From<&ModelConfig> for PlantConstants {
    fn from(cfg: &ModelConfig) -> Self {
        Self {
            heating_capacity_k: cfg.heating_capacity_k,
            rated_output_kw: cfg.rated_output_kw,
            solar_reference_w_m2: cfg.solar_reference_w_m2,
        }
    }
}

impl Default for PlantConstants {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

/// Prediction for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulatedSlot {
    /// Indoor temperature at the end of the slot (°C)
    pub indoor_temp: f64,
    /// Electrical energy drawn over the slot (kWh)
    pub energy_kwh: f64,
    /// Heat delivered over the slot (kWh)
    pub heat_kwh: f64,
    /// Wind or irradiance was missing and assumed zero
    pub low_confidence: bool,
}

/// Stateless thermal model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThermalModel {
    plant: PlantConstants,
}

impl ThermalModel {
    pub fn new(plant: PlantConstants) -> Self {
        Self { plant }
    }

    pub fn plant(&self) -> &PlantConstants {
        &self.plant
    }

    /// Envelope loss multiplier; 1.0 is the calm baseline.
    pub fn loss_factor(weather: &WeatherPoint, params: &ThermalParameters) -> f64 {
        1.0 + params.wind_factor * weather.wind_speed.unwrap_or(0.0).max(0.0)
    }

    /// Passive solar contribution to the equilibrium (K, before loss).
    pub fn solar_gain_k(&self, weather: &WeatherPoint, params: &ThermalParameters) -> f64 {
        let irradiance = weather.solar_irradiance.unwrap_or(0.0).max(0.0);
        params.solar_gain_factor * irradiance / self.plant.solar_reference_w_m2
    }

    fn heat_injection_k(&self, modulation_pct: f64) -> f64 {
        modulation_pct.clamp(0.0, 100.0) / 100.0 * self.plant.heating_capacity_k
    }

    /// Temperature the house settles at if conditions and modulation persist.
    pub fn equilibrium(
        &self,
        weather: &WeatherPoint,
        params: &ThermalParameters,
        modulation_pct: f64,
    ) -> f64 {
        let gain = self.heat_injection_k(modulation_pct) + self.solar_gain_k(weather, params);
        weather.outdoor_temp + gain / Self::loss_factor(weather, params)
    }

    /// Fraction of the distance to equilibrium that remains after `dt_hours`.
    fn retention(dt_hours: f64, params: &ThermalParameters) -> f64 {
        (-dt_hours.max(0.0) / params.thermal_lag_hours).exp()
    }

    /// Advance one slot.
    pub fn step(
        &self,
        indoor_temp: f64,
        weather: &WeatherPoint,
        dt_hours: f64,
        params: &ThermalParameters,
        modulation_pct: f64,
    ) -> SimulatedSlot {
        let modulation = modulation_pct.clamp(0.0, 100.0);
        let t_eq = self.equilibrium(weather, params, modulation);
        let a = Self::retention(dt_hours, params);

        let heat_kwh = modulation / 100.0 * self.plant.rated_output_kw * dt_hours.max(0.0);
        let cop = params.cop_curve.cop_at(weather.outdoor_temp);

        SimulatedSlot {
            indoor_temp: t_eq + (indoor_temp - t_eq) * a,
            energy_kwh: heat_kwh / cop,
            heat_kwh,
            low_confidence: weather.has_missing_inputs(),
        }
    }

    /// Simulate a schedule over forecast slots.
    ///
    /// Returns one entry per slot that has a modulation; a schedule shorter
    /// than the forecast truncates the result.
    pub fn simulate(
        &self,
        initial_indoor_temp: f64,
        forecast: &[ForecastSlot],
        params: &ThermalParameters,
        schedule: &[f64],
    ) -> Vec<SimulatedSlot> {
        let mut indoor = initial_indoor_temp;
        forecast
            .iter()
            .zip(schedule)
            .map(|(slot, &modulation)| {
                let out = self.step(indoor, &slot.weather, slot.duration_hours, params, modulation);
                indoor = out.indoor_temp;
                out
            })
            .collect()
    }

    /// Modulation that brings `indoor_temp` exactly to `setpoint` by the end
    /// of the slot. Unclamped: negative means passive gains overshoot,
    /// above 100 means the heat pump cannot get there in one slot.
    pub fn required_modulation(
        &self,
        indoor_temp: f64,
        weather: &WeatherPoint,
        dt_hours: f64,
        params: &ThermalParameters,
        setpoint: f64,
    ) -> f64 {
        let a = Self::retention(dt_hours, params);
        if a >= 1.0 {
            return 0.0;
        }
        let needed_eq = (setpoint - indoor_temp * a) / (1.0 - a);
        let needed_heat = (needed_eq - weather.outdoor_temp) * Self::loss_factor(weather, params)
            - self.solar_gain_k(weather, params);
        needed_heat / self.plant.heating_capacity_k * 100.0
    }
}
