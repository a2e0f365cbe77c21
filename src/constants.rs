//! M-Bus Protocol Constants
//!
//! This module defines constants used by the heat meter reader, based on the
//! EN 13757-2/3 standard and the fixed request set the meter expects.

use std::time::Duration;

// ----------------------------------------------------------------------------
// Frame markers
// ----------------------------------------------------------------------------

/// Single character acknowledgment frame
pub const MBUS_FRAME_ACK: u8 = 0xE5;

/// Start marker of control and long frames (appears at index 0 and 3)
pub const MBUS_FRAME_LONG_START: u8 = 0x68;

/// Stop marker of every frame except the single character ACK
pub const MBUS_FRAME_STOP: u8 = 0x16;

/// Bytes of a long frame that are not counted by the L field (68 L L 68 .. CS 16)
pub const MBUS_FRAME_OVERHEAD: usize = 6;

/// Length of the fixed header `68 L L 68`
pub const MBUS_FRAME_HEADER_LENGTH: usize = 4;

/// Largest long frame possible with a one byte L field
pub const MBUS_FRAME_MAX_LENGTH: usize = 0xFF + MBUS_FRAME_OVERHEAD;

// ----------------------------------------------------------------------------
// Control / CI fields of the data telegram
// ----------------------------------------------------------------------------

/// Control field of an RSP_UD response (slave to master)
pub const MBUS_CONTROL_MASK_RSP_UD: u8 = 0x08;

/// Frame count bit OR-ed into the poll request's control byte on every other poll.
/// The request control byte `0x53` already has it set, so the poll frame does not change.
pub const MBUS_CONTROL_MASK_FCB_TOGGLE: u8 = 0x10;

/// CI field of a variable data structure response
pub const MBUS_CONTROL_INFO_RESP_VARIABLE: u8 = 0x72;

/// Length of the fixed data header following CI=0x72
pub const MBUS_DATA_VARIABLE_HEADER_LENGTH: usize = 12;

// ----------------------------------------------------------------------------
// DIF / VIF
// ----------------------------------------------------------------------------

/// DIF (Data Information Field) mask for data length and coding
pub const MBUS_DATA_RECORD_DIF_MASK_DATA: u8 = 0x0F;

/// DIF mask for function
pub const MBUS_DATA_RECORD_DIF_MASK_FUNCTION: u8 = 0x30;

/// DIF extension bit
pub const MBUS_DIB_DIF_EXTENSION_BIT: u8 = 0x80;

/// VIF without extension
pub const MBUS_DIB_VIF_WITHOUT_EXTENSION: u8 = 0x7F;

/// First VIF byte of the "extended VIF, table FD" marker
pub const MBUS_DIB_VIF_EXTENSION_FD: u8 = 0xFD;

/// VIFE (table FD) selecting the binary error flags record
pub const MBUS_DIB_VIFE_ERROR_FLAGS: u8 = 0x17;

// ----------------------------------------------------------------------------
// Line parameters and timing
// ----------------------------------------------------------------------------

/// Fixed baud rate of the meter's optical/wired interface
pub const MBUS_DEFAULT_BAUDRATE: u32 = 2400;

/// Bits on the wire per character: start + 8 data + even parity + stop
pub const MBUS_BITS_PER_CHARACTER: u64 = 11;

/// Nominal silence after which a reply is considered lost
pub const MBUS_RX_TIMEOUT: Duration = Duration::from_millis(500);

/// Gap after the last received byte before an acknowledged init step is followed up
pub const MBUS_INIT_STEP_GAP: Duration = Duration::from_millis(20);

/// On-time of the new-data indicator
pub const MBUS_INDICATOR_PULSE: Duration = Duration::from_millis(200);

// ----------------------------------------------------------------------------
// Derived values
// ----------------------------------------------------------------------------

/// Specific heat capacity of water in J/(kg*K), one litre taken as one kilogram
pub const WATER_HEAT_CAPACITY: f64 = 4193.0;

/// Divisor turning m^3/h into l/s
pub const FLOW_M3H_TO_LS: f64 = 3.6;

/// Status text published when no telegram could be read
pub const STATUS_NO_READOUT: &str = "No readout from heat meter";

/// Status text published when no error flag is set
pub const STATUS_OK: &str = "OK";

/// Separator between status flag descriptions
pub const STATUS_SEPARATOR: &str = " | ";
