//! # Heat Meter Reader
//!
//! [`Meter`] ties the link layer, the record decoder and the derived value
//! engine together. All work happens in [`Meter::tick`], which is called
//! periodically and never blocks:
//!
//! 1. the supervisor checks the receive timeout and the init gap,
//! 2. the bytes currently waiting are fed to the synchronizer,
//! 3. complete candidates are validated, acknowledged or decoded and published,
//! 4. if a request is due and no reply is outstanding, the handshake builds it
//!    and it is written to the transport.
//!
//! Decoded values leave through a [`MeterSink`]; only channels listed in
//! [`MeterConfig::outputs`] are published. An optional [`Indicator`] is pulsed
//! for every decoded data telegram.
//!
//! ## Usage
//!
//! ```rust
//! use mbus_heatmeter::config::MeterConfig;
//! use mbus_heatmeter::mbus::MockTransport;
//! use mbus_heatmeter::meter::{Channel, Meter, MeterSink};
//! use std::time::Instant;
//!
//! struct Discard;
//! impl MeterSink for Discard {
//!     fn publish(&mut self, _channel: Channel, _value: f64) {}
//!     fn publish_status(&mut self, _text: &str) {}
//! }
//!
//! let mut meter = Meter::new(MeterConfig::default()).unwrap();
//! let mut transport = MockTransport::new();
//!
//! meter.trigger();
//! let report = meter.tick(Instant::now(), &mut transport, &mut Discard, None).unwrap();
//! assert_eq!(report.sent_bytes, 14);
//! ```

use crate::config::MeterConfig;
use crate::constants::STATUS_NO_READOUT;
use crate::derived::{DerivedState, Readings};
use crate::error::{FrameError, MBusError};
use crate::logging::log_frame;
use crate::mbus::frame::validate_frame;
use crate::mbus::handshake::{Handshake, InitState};
use crate::mbus::serial::ByteTransport;
use crate::mbus::supervisor::LinkSupervisor;
use crate::mbus::sync::{FeedResult, FrameSynchronizer};
use crate::payload::record::{decode_telegram, MBusRecordValue, Quantity, Telegram};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Output channels of the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Energy,
    Volume,
    Power,
    Flow,
    FlowTemperature,
    ReturnTemperature,
    TemperatureDifference,
    CalculatedPower,
    DeicingEnergy,
    /// Text channel, published through [`MeterSink::publish_status`]
    Status,
}

impl Channel {
    pub const ALL: [Channel; 10] = [
        Channel::Energy,
        Channel::Volume,
        Channel::Power,
        Channel::Flow,
        Channel::FlowTemperature,
        Channel::ReturnTemperature,
        Channel::TemperatureDifference,
        Channel::CalculatedPower,
        Channel::DeicingEnergy,
        Channel::Status,
    ];

    /// The channels carrying a number.
    pub fn numeric() -> impl Iterator<Item = Channel> {
        Self::ALL.into_iter().filter(|channel| *channel != Channel::Status)
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Channel::Energy | Channel::DeicingEnergy => "kWh",
            Channel::Volume => "m^3",
            Channel::Power | Channel::CalculatedPower => "W",
            Channel::Flow => "m^3/h",
            Channel::FlowTemperature | Channel::ReturnTemperature => "°C",
            Channel::TemperatureDifference => "K",
            Channel::Status => "",
        }
    }

    pub fn from_quantity(quantity: Quantity) -> Channel {
        match quantity {
            Quantity::Energy => Channel::Energy,
            Quantity::Volume => Channel::Volume,
            Quantity::Power => Channel::Power,
            Quantity::Flow => Channel::Flow,
            Quantity::FlowTemperature => Channel::FlowTemperature,
            Quantity::ReturnTemperature => Channel::ReturnTemperature,
            Quantity::TemperatureDifference => Channel::TemperatureDifference,
            Quantity::Status => Channel::Status,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Energy => "energy",
            Channel::Volume => "volume",
            Channel::Power => "power",
            Channel::Flow => "flow",
            Channel::FlowTemperature => "flow_temperature",
            Channel::ReturnTemperature => "return_temperature",
            Channel::TemperatureDifference => "temperature_difference",
            Channel::CalculatedPower => "calculated_power",
            Channel::DeicingEnergy => "deicing_energy",
            Channel::Status => "status",
        };
        f.write_str(name)
    }
}

/// Receives the published values.
pub trait MeterSink {
    fn publish(&mut self, channel: Channel, value: f64);
    fn publish_status(&mut self, text: &str);
}

/// A binary "new data" signal, e.g. an LED.
pub trait Indicator {
    fn set(&mut self, on: bool);
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub bytes_received: usize,
    pub acknowledgments: usize,
    /// Data telegrams decoded and published
    pub telegrams: usize,
    /// Recoverable protocol errors (rejected frames, unknown telegrams, aborted decodes)
    pub errors: usize,
    pub timed_out: bool,
    /// Step of the request written on this tick
    pub sent: Option<InitState>,
    pub sent_bytes: usize,
}

/// State carried across ticks.
#[derive(Debug)]
pub struct MeterState {
    pub sync: FrameSynchronizer,
    pub handshake: Handshake,
    pub supervisor: LinkSupervisor,
    pub derived: DerivedState,
    trigger_next: bool,
    indicator_off_at: Option<Instant>,
}

impl MeterState {
    pub fn new(config: &MeterConfig) -> Self {
        MeterState {
            sync: FrameSynchronizer::with_capacity(config.max_frame_len),
            handshake: Handshake::new(),
            supervisor: LinkSupervisor::with_timing(
                config.baud_rate,
                config.rx_timeout(),
                config.init_gap(),
            ),
            derived: DerivedState::new(),
            trigger_next: false,
            indicator_off_at: None,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.trigger_next
    }
}

/// One attached heat meter.
#[derive(Debug)]
pub struct Meter {
    config: MeterConfig,
    state: MeterState,
}

impl Meter {
    pub fn new(config: MeterConfig) -> Result<Self, MBusError> {
        config.validate()?;
        let state = MeterState::new(&config);
        Ok(Meter { config, state })
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    pub fn state(&self) -> &MeterState {
        &self.state
    }

    /// Requests the next transmission, called by the poll timer.
    pub fn trigger(&mut self) {
        self.state.trigger_next = true;
    }

    /// Logs the active configuration.
    pub fn dump_config(&self) {
        info!("Heat meter M-Bus:");
        info!("  Baud rate: {} (8E1)", self.config.baud_rate);
        info!("  RX timeout: {} ms", self.config.rx_timeout_ms);
        info!("  Poll interval: {} ms", self.config.poll_interval_ms);
        info!("  Energy decimals: {}", self.config.energy_decimals);
        let outputs: Vec<String> = self.config.outputs.iter().map(Channel::to_string).collect();
        info!("  Outputs: {}", outputs.join(", "));
    }

    /// Runs one cooperative tick.
    ///
    /// Protocol errors are handled here and counted in the report; only
    /// transport failures are returned.
    pub fn tick(
        &mut self,
        now: Instant,
        transport: &mut dyn ByteTransport,
        sink: &mut dyn MeterSink,
        indicator: Option<&mut dyn Indicator>,
    ) -> Result<TickReport, MBusError> {
        let mut report = TickReport::default();

        let verdict = self.state.supervisor.check(
            now,
            self.state.sync.is_receiving(),
            self.state.handshake.is_complete(),
            self.state.handshake.is_acknowledged(),
        );
        if verdict.timed_out {
            warn!("{}", MBusError::LinkTimeout);
            self.publish_no_data(sink);
            self.state.sync.reset();
            report.timed_out = true;
        }
        if verdict.trigger {
            self.state.trigger_next = true;
        }

        let available = transport.available()?;
        if available > 0 {
            self.state.supervisor.on_receive(now);
        }
        for _ in 0..available {
            let Some(byte) = transport.read_byte()? else {
                break;
            };
            report.bytes_received += 1;
            match self.state.sync.feed(byte) {
                FeedResult::Acknowledged => {
                    self.state.handshake.acknowledge();
                    report.acknowledgments += 1;
                }
                FeedResult::FrameReady(candidate) => {
                    self.handle_candidate(&candidate, now, sink, &mut report);
                }
                FeedResult::FrameTooLong(len) => {
                    warn!("{}", FrameError::TooLong(len));
                    self.publish_no_data(sink);
                    report.errors += 1;
                }
                FeedResult::Idle | FeedResult::Accumulating => {}
            }
        }

        if self.state.trigger_next && !self.state.sync.is_receiving() {
            self.state.trigger_next = false;
            self.send_next(now, transport, &mut report)?;
        }

        if let Some(indicator) = indicator {
            self.drive_indicator(now, indicator, &report);
        }

        Ok(report)
    }

    fn handle_candidate(
        &mut self,
        candidate: &[u8],
        now: Instant,
        sink: &mut dyn MeterSink,
        report: &mut TickReport,
    ) {
        log_frame("M-Bus received", candidate);

        let frame = match validate_frame(candidate) {
            Ok(frame) => frame,
            // Any intact frame acknowledges an init step, even one without C/A/CI
            Err(FrameError::MissingHeader { .. }) if !self.state.handshake.is_complete() => {
                self.state.handshake.acknowledge();
                report.acknowledgments += 1;
                return;
            }
            Err(err) => {
                warn!("{err}");
                self.publish_no_data(sink);
                report.errors += 1;
                return;
            }
        };

        if !self.state.handshake.is_complete() {
            self.state.handshake.acknowledge();
            report.acknowledgments += 1;
            return;
        }

        match decode_telegram(&frame) {
            Ok(telegram) => {
                self.publish_telegram(&telegram, now, sink);
                report.telegrams += 1;
                if let Some(abort) = &telegram.abort {
                    warn!("{abort}");
                    report.errors += 1;
                }
            }
            Err(err) => {
                warn!("{err}");
                self.publish_no_data(sink);
                report.errors += 1;
            }
        }
    }

    fn publish_telegram(&mut self, telegram: &Telegram, now: Instant, sink: &mut dyn MeterSink) {
        debug!(
            "Telegram from {} id {:?}, access number {}, {} records",
            telegram.header.manufacturer,
            telegram.header.id,
            telegram.header.access_number,
            telegram.records.len()
        );

        for record in &telegram.records {
            let channel = Channel::from_quantity(record.quantity);
            match record.value {
                MBusRecordValue::Status(flags) => {
                    if self.config.is_enabled(Channel::Status) {
                        sink.publish_status(&flags.describe());
                    }
                }
                // Integrated energy is published by the derived value engine
                MBusRecordValue::Numeric(_)
                    if channel == Channel::Energy && self.config.energy_decimals > 0 => {}
                MBusRecordValue::Numeric(value) => self.publish(sink, channel, value),
            }
        }

        let readings = Readings::from_telegram(telegram);
        let derived = self.state.derived.update(&readings, now, self.config.energy_decimals);
        if let Some(energy) = derived.energy {
            self.publish(sink, Channel::Energy, energy);
        }
        self.publish(sink, Channel::CalculatedPower, derived.calculated_power);
        if let Some(deicing) = derived.deicing_energy {
            self.publish(sink, Channel::DeicingEnergy, deicing);
        }

        self.state.indicator_off_at = Some(now + self.config.indicator_pulse());
    }

    fn publish(&self, sink: &mut dyn MeterSink, channel: Channel, value: f64) {
        if self.config.is_enabled(channel) {
            sink.publish(channel, value);
        }
    }

    /// Publishes the "no data" sentinel on every enabled output.
    fn publish_no_data(&mut self, sink: &mut dyn MeterSink) {
        if self.config.is_enabled(Channel::Status) {
            sink.publish_status(STATUS_NO_READOUT);
        }
        for channel in Channel::numeric() {
            self.publish(sink, channel, f64::NAN);
        }
        self.state.derived.invalidate();
    }

    fn send_next(
        &mut self,
        now: Instant,
        transport: &mut dyn ByteTransport,
        report: &mut TickReport,
    ) -> Result<(), MBusError> {
        transport.flush()?;
        self.state.sync.reset();

        let before = self.state.handshake.state();
        let request = self.state.handshake.next_request();
        let after = self.state.handshake.state();
        if before != after {
            debug!("Handshake {before} -> {after}");
        }

        if let Some(request) = request {
            transport.write_all(&request.bytes)?;
            self.state.supervisor.on_transmit(now, request.bytes.len());
            self.state.sync.await_reply();
            report.sent = Some(request.state);
            report.sent_bytes = request.bytes.len();
        }
        Ok(())
    }

    fn drive_indicator(
        &mut self,
        now: Instant,
        indicator: &mut dyn Indicator,
        report: &TickReport,
    ) {
        if report.telegrams > 0 {
            indicator.set(true);
        } else if let Some(off_at) = self.state.indicator_off_at {
            if now >= off_at {
                indicator.set(false);
                self.state.indicator_off_at = None;
            }
        }
    }
}
