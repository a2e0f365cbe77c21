//! # Heat Meter Error Flags
//!
//! The meter reports its error state as a binary record (`VIF FD 17`). Each set
//! bit maps to a fixed description; the published status string joins the
//! descriptions of all set bits in ascending bit order.

use crate::constants::{STATUS_OK, STATUS_SEPARATOR};
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Error flags reported in the status record.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u32 {
        const SENSOR1_CABLE_BREAK   = 0b0000_0001;
        const SENSOR1_SHORT_CIRCUIT = 0b0000_0010;
        const SENSOR2_CABLE_BREAK   = 0b0000_0100;
        const SENSOR2_SHORT_CIRCUIT = 0b0000_1000;
        const FLOW_MEASUREMENT      = 0b0001_0000;
        const ELECTRONIC_DEFECT     = 0b0010_0000;
        const RESET                 = 0b0100_0000;
        const LOW_BATTERY           = 0b1000_0000;
    }
}

const DESCRIPTIONS: [(StatusFlags, &str); 8] = [
    (StatusFlags::SENSOR1_CABLE_BREAK, "Temperature Sensor 1: Cable Break"),
    (StatusFlags::SENSOR1_SHORT_CIRCUIT, "Temperature Sensor 1: Short Circuit"),
    (StatusFlags::SENSOR2_CABLE_BREAK, "Temperature Sensor 2: Cable Break"),
    (StatusFlags::SENSOR2_SHORT_CIRCUIT, "Temperature Sensor 2: Short Circuit"),
    (StatusFlags::FLOW_MEASUREMENT, "Error at Flow Measurement System"),
    (StatusFlags::ELECTRONIC_DEFECT, "Electronic Defect"),
    (StatusFlags::RESET, "Reset"),
    (StatusFlags::LOW_BATTERY, "Low Battery"),
];

impl StatusFlags {
    /// Builds the flag set from a raw record value. Bits above 7 are ignored.
    pub fn from_raw(raw: i32) -> Self {
        StatusFlags::from_bits_truncate(raw as u32)
    }

    /// Human readable status, `"OK"` when no flag is set.
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return STATUS_OK.to_string();
        }
        DESCRIPTIONS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, text)| *text)
            .collect::<Vec<_>>()
            .join(STATUS_SEPARATOR)
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
