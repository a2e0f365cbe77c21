//! # mbus-heatmeter - Wired M-Bus Reader for a Heat Meter
//!
//! The mbus-heatmeter crate reads a heat/energy meter over a wired M-Bus
//! (EN 13757-2/3) serial line at 2400 baud, 8E1. It brings the meter into its
//! data mode with a fixed five step handshake, polls it, and decodes the
//! returned telegrams into energy, volume, power, flow and temperatures.
//!
//! ## Features
//!
//! - Byte stream synchronization with single character ACK detection
//! - Long frame validation (markers, redundant length, checksum)
//! - Lazy DIF/VIF record decoding driven by a quantity table
//! - Calculated thermal power, integrated energy and de-icing energy
//! - Handshake and FCB handling with timeout driven recovery
//! - A non-blocking tick loop over any [`mbus::ByteTransport`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mbus_heatmeter::{Meter, MeterConfig, SerialTransport};
//!
//! # fn main() -> Result<(), mbus_heatmeter::MBusError> {
//! let meter = Meter::new(MeterConfig::default())?;
//! let transport = SerialTransport::connect("/dev/ttyUSB0")?;
//! meter.dump_config();
//! # let _ = transport;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod derived;
pub mod error;
pub mod logging;
pub mod mbus;
pub mod meter;
pub mod payload;
pub mod util;

pub use crate::config::MeterConfig;
pub use crate::error::{DecodeError, FrameError, MBusError};
pub use crate::logging::{init_logger, log_info};

pub use mbus::serial::{ByteTransport, SerialConfig, SerialTransport};
pub use mbus::{MBusFrame, MockTransport};
pub use meter::{Channel, Indicator, Meter, MeterSink, TickReport};
pub use payload::{decode_telegram, MBusRecord, MBusRecordValue, Quantity, StatusFlags, Telegram};
