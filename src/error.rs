//! # M-Bus Error Handling
//!
//! This module defines the error types of the heat meter reader. Structural
//! problems of a received frame are reported as [`FrameError`], problems inside
//! the record area of a data telegram as [`DecodeError`]. Both roll up into
//! [`MBusError`], which also carries link and I/O failures.
//!
//! Every protocol error is recoverable: the meter publishes "no data" sentinels,
//! logs the classification and waits for the next start marker.

use crate::util::hex::HexError;
use thiserror::Error;

/// Structural classification of a rejected candidate frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Byte 0 or byte 3 is not the 0x68 start marker.
    #[error("Invalid frame start")]
    BadStart,

    /// The two redundant L fields disagree.
    #[error("Invalid length: 0x{first:02X} != 0x{second:02X}")]
    BadLength { first: u8, second: u8 },

    /// The L field does not describe the number of bytes received.
    #[error("Length mismatch: L=0x{declared:02X}, {actual} bytes received")]
    LengthMismatch { declared: u8, actual: usize },

    /// The last byte is not the 0x16 stop marker.
    #[error("Invalid stop: 0x{0:02X}")]
    BadStop(u8),

    /// The checksum byte does not match the sum of C, A, CI and data.
    #[error("Invalid checksum: expected {expected}, calculated {calculated}")]
    BadChecksum { expected: u8, calculated: u8 },

    /// Structurally valid, but L is below 3 so there are no C, A and CI fields.
    #[error("Frame without C/A/CI fields: L=0x{declared:02X}")]
    MissingHeader { declared: u8 },

    /// The candidate grew past the receive buffer without completing.
    #[error("Frame too long: {0} bytes")]
    TooLong(usize),
}

/// Reasons for abandoning the remaining records of a data telegram.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// DIF length/coding nibble is not an integer of 1 to 4 bytes.
    #[error("Unsupported coding 0x{0:02X}")]
    UnsupportedWidth(u8),

    /// VIF (masked to 7 bits) matches no known quantity.
    #[error("Unsupported value type 0x{0:02X}")]
    UnrecognizedQuantity(u8),

    /// A record runs past the end of the record area.
    #[error("Premature end of data: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
}

/// Represents the different error types that can occur in the crate.
#[derive(Debug, Error)]
pub enum MBusError {
    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// A received frame failed structural validation.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Record decoding stopped early.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// No reply arrived within the receive timeout.
    #[error("Last transmission too long ago. Reset RX index.")]
    LinkTimeout,

    /// A valid frame that is not the expected data telegram.
    #[error("Unknown frame: C=0x{control:02X} CI=0x{control_information:02X}")]
    UnknownTelegram { control: u8, control_information: u8 },

    /// I/O failure on the byte transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Indicates an invalid hexadecimal string was provided.
    #[error("Invalid hexadecimal string: {0}")]
    InvalidHexString(#[from] HexError),

    /// Rejected configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<tokio_serial::Error> for MBusError {
    fn from(err: tokio_serial::Error) -> Self {
        MBusError::SerialPortError(err.to_string())
    }
}
