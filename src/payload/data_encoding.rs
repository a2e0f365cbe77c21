//! # M-Bus Data Encoding and Decoding
//!
//! This module provides functions for decoding the data types found in the heat
//! meter's telegrams: little-endian signed integers of 1 to 4 bytes, packed BCD
//! identification numbers and the 2-byte manufacturer code. It also holds the
//! power-of-ten scaling shared by every numeric record.

use nom::{
    combinator::map,
    number::complete::{le_i16, le_i24, le_i32, le_i8},
    IResult,
};

/// Decodes a little-endian signed integer of `size` bytes.
///
/// The value is sign-extended from the most significant byte actually present,
/// so `[0xFF]` is -1 and `[0x00, 0x80]` is -32768.
pub fn decode_int(input: &[u8], size: usize) -> IResult<&[u8], i32> {
    match size {
        1 => map(le_i8, i32::from)(input),
        2 => map(le_i16, i32::from)(input),
        3 => le_i24(input),
        4 => le_i32(input),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

/// Scales a raw integer by `10^exponent`.
///
/// Negative exponents divide by the matching positive power so that the result
/// is the correctly rounded quotient.
pub fn convert_value(raw: i32, exponent: i8) -> f64 {
    let value = f64::from(raw);
    let magnitude = 10f64.powi(i32::from(exponent).abs());
    if exponent >= 0 {
        value * magnitude
    } else {
        value / magnitude
    }
}

/// Decodes a little-endian packed BCD number (least significant byte first).
///
/// Returns `None` if any nibble is not a decimal digit.
pub fn decode_bcd(input: &[u8]) -> Option<u32> {
    let mut value = 0u32;
    for &byte in input.iter().rev() {
        let (high, low) = (byte >> 4, byte & 0x0F);
        if high > 9 || low > 9 {
            return None;
        }
        value = value * 100 + u32::from(high) * 10 + u32::from(low);
    }
    Some(value)
}

/// Decodes the manufacturer ID from the 2-byte field as sent (low byte first).
pub fn mbus_decode_manufacturer(low: u8, high: u8) -> String {
    let mut id = (u32::from(high) << 8) + u32::from(low);
    let mut manufacturer = String::with_capacity(3);

    manufacturer.push(char::from_u32((id / (32 * 32)) + 64).unwrap_or('?'));
    id %= 32 * 32;
    manufacturer.push(char::from_u32((id / 32) + 64).unwrap_or('?'));
    id %= 32;
    manufacturer.push(char::from_u32(id + 64).unwrap_or('?'));

    manufacturer
}
