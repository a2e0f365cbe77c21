//! # Meter Configuration
//!
//! Settings of one attached heat meter, loaded from a JSON file. Every field
//! has a default, so an empty object `{}` is a valid configuration.
//!
//! ```json
//! {
//!   "baud_rate": 2400,
//!   "energy_decimals": 3,
//!   "outputs": ["energy", "power", "calculated_power", "status"]
//! }
//! ```

use crate::constants::{
    MBUS_DEFAULT_BAUDRATE, MBUS_FRAME_MAX_LENGTH, MBUS_FRAME_OVERHEAD, MBUS_INDICATOR_PULSE,
    MBUS_INIT_STEP_GAP, MBUS_RX_TIMEOUT,
};
use crate::error::MBusError;
use crate::meter::Channel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Configuration of the meter reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub baud_rate: u32,
    /// Nominal silence before an outstanding reply counts as lost
    pub rx_timeout_ms: u64,
    /// Quiet time before an acknowledged init step is followed up
    pub init_gap_ms: u64,
    pub indicator_pulse_ms: u64,
    /// Period of the poll trigger
    pub poll_interval_ms: u64,
    /// Period of the cooperative tick
    pub tick_interval_ms: u64,
    /// Decimals shown for energy; above 0 energy is integrated from power
    pub energy_decimals: u8,
    /// Receive buffer size, a candidate reaching it is dropped
    pub max_frame_len: usize,
    /// Channels that have a sink attached
    pub outputs: BTreeSet<Channel>,
}

impl Default for MeterConfig {
    fn default() -> Self {
        MeterConfig {
            baud_rate: MBUS_DEFAULT_BAUDRATE,
            rx_timeout_ms: MBUS_RX_TIMEOUT.as_millis() as u64,
            init_gap_ms: MBUS_INIT_STEP_GAP.as_millis() as u64,
            indicator_pulse_ms: MBUS_INDICATOR_PULSE.as_millis() as u64,
            poll_interval_ms: 10_000,
            tick_interval_ms: 16,
            energy_decimals: 0,
            max_frame_len: MBUS_FRAME_MAX_LENGTH,
            outputs: Channel::ALL.iter().copied().collect(),
        }
    }
}

impl MeterConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MBusError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: MeterConfig = serde_json::from_str(&text)
            .map_err(|e| MBusError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MBusError> {
        if self.baud_rate == 0 {
            return Err(MBusError::Config("baud_rate must not be 0".into()));
        }
        if self.max_frame_len < MBUS_FRAME_OVERHEAD {
            return Err(MBusError::Config(format!(
                "max_frame_len must be at least {MBUS_FRAME_OVERHEAD}, got {}",
                self.max_frame_len
            )));
        }
        if self.tick_interval_ms == 0 || self.poll_interval_ms == 0 {
            return Err(MBusError::Config("intervals must not be 0".into()));
        }
        Ok(())
    }

    pub fn rx_timeout(&self) -> Duration {
        Duration::from_millis(self.rx_timeout_ms)
    }

    pub fn init_gap(&self) -> Duration {
        Duration::from_millis(self.init_gap_ms)
    }

    pub fn indicator_pulse(&self) -> Duration {
        Duration::from_millis(self.indicator_pulse_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.outputs.contains(&channel)
    }
}
