//! # Hex Encoding/Decoding Utilities
//!
//! Hex helpers used for frame logging, the offline decode command and test
//! frames.
//!
//! ## Usage
//!
//! ```rust
//! use mbus_heatmeter::util::hex::{decode_hex, encode_hex, format_hex_pretty};
//!
//! let data = [0x68, 0x08, 0x08, 0x68];
//! assert_eq!(encode_hex(&data), "68080868");
//! assert_eq!(decode_hex("68 08 08 68").unwrap(), data);
//! assert_eq!(format_hex_pretty(&data), "68.08.08.68 (4)");
//! ```

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Encode bytes to lowercase hex string
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode hex string to bytes
///
/// Accepts both uppercase and lowercase hex characters. Whitespace and the
/// `.` separator of [`format_hex_pretty`] are stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = hex_str
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .collect();

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Uppercase bytes separated by dots, followed by the byte count.
pub fn format_hex_pretty(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }
    let bytes: Vec<String> = data.iter().map(|b| format!("{b:02X}")).collect();
    format!("{} ({})", bytes.join("."), data.len())
}
