//! # M-Bus Frame Validation and Packing
//!
//! This module checks complete candidate long frames received from the meter and
//! packs the long frames the reader transmits.
//!
//! A long frame looks like
//!
//! ```text
//! 68 | L | L | 68 | C | A | CI | data ... | CS | 16
//! ```
//!
//! where `L` counts C, A, CI and the data bytes, and `CS` is the 8-bit sum of the
//! same bytes. The single character `E5` acknowledgment is handled by the
//! synchronizer and never reaches this module.
//!
//! ## Usage
//!
//! ```rust
//! use mbus_heatmeter::mbus::frame::{pack_frame, validate_frame};
//!
//! let bytes = pack_frame(0x53, 0xFE, 0x51, &[0x0F, 0x00, 0x00, 0x04, 0x5C]);
//! assert_eq!(bytes[bytes.len() - 2], 0x11);
//!
//! let frame = validate_frame(&bytes).unwrap();
//! assert_eq!(frame.control, 0x53);
//! ```

use crate::constants::{
    MBUS_FRAME_HEADER_LENGTH, MBUS_FRAME_LONG_START, MBUS_FRAME_OVERHEAD, MBUS_FRAME_STOP,
};
use crate::error::FrameError;
use bytes::{BufMut, BytesMut};

/// A long frame that passed every structural check.
///
/// This is the validated payload handed to the record decoder: the C, A and CI
/// fields plus the data bytes between CI and the checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MBusFrame {
    pub control: u8,
    pub address: u8,
    pub control_information: u8,
    pub data: Vec<u8>,
    pub checksum: u8,
}

impl MBusFrame {
    /// C, A, CI and data, i.e. everything the checksum covers.
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.data.len() + 3);
        payload.push(self.control);
        payload.push(self.address);
        payload.push(self.control_information);
        payload.extend_from_slice(&self.data);
        payload
    }
}

/// Unsigned 8-bit sum of `bytes`, modulo 256.
pub fn calculate_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Validates a complete candidate frame.
///
/// The checks run in a fixed order and the first failure wins:
/// start markers, redundant length fields, stop marker, checksum.
pub fn validate_frame(candidate: &[u8]) -> Result<MBusFrame, FrameError> {
    if candidate.len() < MBUS_FRAME_OVERHEAD
        || candidate[0] != MBUS_FRAME_LONG_START
        || candidate[3] != MBUS_FRAME_LONG_START
    {
        return Err(FrameError::BadStart);
    }

    let (first, second) = (candidate[1], candidate[2]);
    if first != second {
        return Err(FrameError::BadLength { first, second });
    }
    if candidate.len() != first as usize + MBUS_FRAME_OVERHEAD {
        return Err(FrameError::LengthMismatch {
            declared: first,
            actual: candidate.len(),
        });
    }

    let stop = candidate[candidate.len() - 1];
    if stop != MBUS_FRAME_STOP {
        return Err(FrameError::BadStop(stop));
    }

    let body = &candidate[MBUS_FRAME_HEADER_LENGTH..candidate.len() - 2];
    let expected = candidate[candidate.len() - 2];
    let calculated = calculate_checksum(body);
    if expected != calculated {
        return Err(FrameError::BadChecksum {
            expected,
            calculated,
        });
    }

    // Control frames (L = 3) and longer; anything shorter carries no C/A/CI.
    if body.len() < 3 {
        return Err(FrameError::MissingHeader { declared: first });
    }

    Ok(MBusFrame {
        control: body[0],
        address: body[1],
        control_information: body[2],
        data: body[3..].to_vec(),
        checksum: expected,
    })
}

/// Packs a long frame, computing L and the checksum.
pub fn pack_frame(control: u8, address: u8, control_information: u8, data: &[u8]) -> BytesMut {
    let length = (data.len() + 3) as u8;
    let mut buf = BytesMut::with_capacity(data.len() + 3 + MBUS_FRAME_OVERHEAD);
    buf.put_u8(MBUS_FRAME_LONG_START);
    buf.put_u8(length);
    buf.put_u8(length);
    buf.put_u8(MBUS_FRAME_LONG_START);
    buf.put_u8(control);
    buf.put_u8(address);
    buf.put_u8(control_information);
    buf.put_slice(data);
    let checksum = calculate_checksum(&buf[MBUS_FRAME_HEADER_LENGTH..]);
    buf.put_u8(checksum);
    buf.put_u8(MBUS_FRAME_STOP);
    buf
}

/// Recomputes the checksum byte of an already packed long frame in place.
///
/// Used after mutating the control byte of a request.
pub fn refresh_checksum(frame: &mut [u8]) {
    if frame.len() < MBUS_FRAME_OVERHEAD {
        return;
    }
    let end = frame.len() - 2;
    frame[end] = calculate_checksum(&frame[MBUS_FRAME_HEADER_LENGTH..end]);
}
