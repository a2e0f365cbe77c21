//! # Derived Values
//!
//! Quantities computed from a decoded telegram plus state carried between
//! telegrams:
//!
//! - the thermal power from volume flow and temperature difference,
//! - a finer grained energy reading, integrated from the meter's power between
//!   changes of the meter's own (integer kWh) energy register,
//! - the de-icing energy, i.e. the heat taken out of the circuit while the
//!   return is warmer than the flow.
//!
//! Missing inputs are modelled as `None`; the calculated power turns into NaN
//! when either input was not part of the telegram.

use crate::constants::{FLOW_M3H_TO_LS, WATER_HEAT_CAPACITY};
use crate::payload::record::{Quantity, Telegram};
use std::time::{Duration, Instant};

/// The readings of one telegram the derived values depend on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    /// kWh
    pub energy: Option<f64>,
    /// W
    pub power: Option<f64>,
    /// m^3/h
    pub flow: Option<f64>,
    /// K
    pub temperature_difference: Option<f64>,
}

impl Readings {
    pub fn from_telegram(telegram: &Telegram) -> Self {
        Readings {
            energy: telegram.value_of(Quantity::Energy),
            power: telegram.value_of(Quantity::Power),
            flow: telegram.value_of(Quantity::Flow),
            temperature_difference: telegram.value_of(Quantity::TemperatureDifference),
        }
    }
}

/// Values to publish after one telegram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedValues {
    /// Energy to publish when the engine owns the energy output
    pub energy: Option<f64>,
    /// W, NaN if flow or temperature difference was missing
    pub calculated_power: f64,
    /// kWh, only set when the accumulated value changed
    pub deicing_energy: Option<f64>,
}

/// Heat power in W carried by `flow` (m^3/h) at `temperature_difference` (K).
///
/// Zero when nothing flows, NaN when either input is missing.
pub fn calculated_power(flow: Option<f64>, temperature_difference: Option<f64>) -> f64 {
    match (flow, temperature_difference) {
        (Some(flow), Some(tdiff)) if flow > 0.0 => thermal_power(flow, tdiff),
        (Some(_), Some(_)) => 0.0,
        _ => f64::NAN,
    }
}

fn thermal_power(flow: f64, tdiff: f64) -> f64 {
    flow / FLOW_M3H_TO_LS * WATER_HEAT_CAPACITY * tdiff
}

/// Energy in kWh delivered by `power` watts over `elapsed`.
fn energy_kwh(power: f64, elapsed: Duration) -> f64 {
    power / 3600.0 * elapsed.as_secs_f64() / 1000.0
}

/// Running state of the derived value engine.
#[derive(Debug, Clone, Default)]
pub struct DerivedState {
    energy_calc: f64,
    last_energy_calc: Option<Instant>,
    /// The last published energy was a real reading, not the "no data" sentinel
    energy_published: bool,
    deicing_energy: f64,
    last_deicing_calc: Option<Instant>,
}

impl DerivedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Integrated energy estimate in kWh.
    pub fn energy_estimate(&self) -> f64 {
        self.energy_calc
    }

    /// Accumulated de-icing energy in kWh.
    pub fn deicing_energy(&self) -> f64 {
        self.deicing_energy
    }

    /// Marks the energy output as showing "no data".
    ///
    /// The next telegram then resynchronizes the estimate to the meter.
    pub fn invalidate(&mut self) {
        self.energy_published = false;
    }

    /// Feeds the readings of one telegram received at `now`.
    ///
    /// With `energy_decimals == 0` energy is published straight from the
    /// decoder and this engine leaves it alone.
    pub fn update(
        &mut self,
        readings: &Readings,
        now: Instant,
        energy_decimals: u8,
    ) -> DerivedValues {
        let energy = if energy_decimals > 0 {
            self.integrate_energy(readings, now)
        } else {
            None
        };

        DerivedValues {
            energy,
            calculated_power: calculated_power(readings.flow, readings.temperature_difference),
            deicing_energy: self.accumulate_deicing(readings, now),
        }
    }

    fn integrate_energy(&mut self, readings: &Readings, now: Instant) -> Option<f64> {
        let energy = readings.energy.filter(|energy| *energy > 0.0)?;

        let mut publish = None;
        if energy.floor() != self.energy_calc.floor() || !self.energy_published {
            self.energy_calc = energy;
            self.energy_published = true;
            publish = Some(energy);
        } else if let Some(power) = readings.power.filter(|power| *power >= 0.0) {
            let elapsed = self
                .last_energy_calc
                .map(|last| now.saturating_duration_since(last))
                .unwrap_or_default();
            self.energy_calc += energy_kwh(power, elapsed);
            if energy.floor() == self.energy_calc.floor() {
                publish = Some(self.energy_calc);
            }
        }
        self.last_energy_calc = Some(now);

        publish
    }

    fn accumulate_deicing(&mut self, readings: &Readings, now: Instant) -> Option<f64> {
        let mut publish = None;
        if let (Some(last), Some(flow), Some(tdiff)) =
            (self.last_deicing_calc, readings.flow, readings.temperature_difference)
        {
            if flow > 0.0 && tdiff < 0.0 {
                let elapsed = now.saturating_duration_since(last);
                self.deicing_energy -= energy_kwh(thermal_power(flow, tdiff), elapsed);
                publish = Some(self.deicing_energy);
            }
        }
        self.last_deicing_calc = Some(now);
        publish
    }
}
