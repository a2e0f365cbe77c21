//! # M-Bus Serial Communication
//!
//! This module provides the byte transport the meter reader runs on. The
//! reader never blocks: each tick asks how many bytes are waiting, reads only
//! those and writes whole requests.
//!
//! [`ByteTransport`] is the seam between the protocol core and the line.
//! [`SerialTransport`] implements it on a real serial port (2400 baud, 8 data
//! bits, even parity, 1 stop bit), `MockTransport` in [`crate::mbus::serial_mock`]
//! implements it in memory.

use crate::constants::MBUS_DEFAULT_BAUDRATE;
use crate::error::MBusError;
use crate::logging::log_frame;
use std::io::{Read, Write};
use std::time::Duration;
use tokio_serial::SerialPort;

/// Configuration for serial connection.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baudrate: u32,
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: MBUS_DEFAULT_BAUDRATE,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Non-blocking byte level access to the meter.
pub trait ByteTransport {
    /// Number of received bytes that can be read without blocking.
    fn available(&mut self) -> Result<usize, MBusError>;

    /// Reads one received byte, `None` if nothing is waiting.
    fn read_byte(&mut self) -> Result<Option<u8>, MBusError>;

    /// Queues `data` for transmission.
    fn write_all(&mut self, data: &[u8]) -> Result<(), MBusError>;

    /// Waits until everything queued was handed to the line.
    fn flush(&mut self) -> Result<(), MBusError>;
}

/// Represents a handle to the meter's serial line.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Opens `port_name` with the default line settings.
    pub fn connect(port_name: &str) -> Result<SerialTransport, MBusError> {
        Self::connect_with_config(port_name, SerialConfig::default())
    }

    /// Opens `port_name` at the configured baud rate with 8E1 framing.
    pub fn connect_with_config(
        port_name: &str,
        config: SerialConfig,
    ) -> Result<SerialTransport, MBusError> {
        let port = tokio_serial::new(port_name, config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::Even)
            .timeout(config.timeout)
            .open()
            .map_err(|e| MBusError::SerialPortError(e.to_string()))?;

        Ok(SerialTransport { port })
    }
}

impl ByteTransport for SerialTransport {
    fn available(&mut self) -> Result<usize, MBusError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_byte(&mut self) -> Result<Option<u8>, MBusError> {
        if self.available()? == 0 {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), MBusError> {
        log_frame("M-Bus write", data);
        self.port.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MBusError> {
        self.port.flush()?;
        Ok(())
    }
}
