//! # M-Bus Data Records
//!
//! Decoding of the variable data structure carried by the meter's RSP_UD
//! telegram (C=0x08, CI=0x72).
//!
//! The data area starts with a 12-byte fixed header followed by a sequence of
//! self-describing records:
//!
//! ```text
//! DIF [DIFE...] VIF [VIFE...] value
//! ```
//!
//! The low nibble of the DIF selects the value width (1 to 4 byte signed
//! integers). The VIF selects the physical quantity and its decimal exponent.
//! Classification is table driven, see [`QUANTITY_RULES`].
//!
//! Decoding is lazy: [`RecordDecoder`] yields one record at a time and stops for
//! good after the first error, so records decoded before an unsupported entry
//! stay usable.
//!
//! ## Usage
//!
//! ```rust
//! use mbus_heatmeter::mbus::frame::{pack_frame, validate_frame};
//! use mbus_heatmeter::payload::record::{decode_telegram, Quantity};
//!
//! let mut data = vec![0x78, 0x56, 0x34, 0x12, 0x24, 0x40, 0x01, 0x04, 0x2A, 0x00, 0x00, 0x00];
//! data.extend_from_slice(&[0x04, 0x03, 0xD2, 0x04, 0x00, 0x00, 0x00]);
//! let bytes = pack_frame(0x08, 0x00, 0x72, &data);
//!
//! let frame = validate_frame(&bytes).unwrap();
//! let telegram = decode_telegram(&frame).unwrap();
//! assert_eq!(telegram.value_of(Quantity::Energy), Some(1.234));
//! ```

use crate::constants::{
    MBUS_CONTROL_INFO_RESP_VARIABLE, MBUS_CONTROL_MASK_RSP_UD, MBUS_DATA_RECORD_DIF_MASK_DATA,
    MBUS_DATA_RECORD_DIF_MASK_FUNCTION, MBUS_DATA_VARIABLE_HEADER_LENGTH,
    MBUS_DIB_DIF_EXTENSION_BIT, MBUS_DIB_VIFE_ERROR_FLAGS, MBUS_DIB_VIF_EXTENSION_FD,
    MBUS_DIB_VIF_WITHOUT_EXTENSION,
};
use crate::error::{DecodeError, MBusError};
use crate::mbus::frame::MBusFrame;
use crate::payload::data_encoding::{
    convert_value, decode_bcd, decode_int, mbus_decode_manufacturer,
};
use crate::payload::status::StatusFlags;
use nom::{
    bytes::complete::take,
    number::complete::{be_u8, le_u16},
    sequence::tuple,
    IResult,
};
use std::fmt;

/// Physical quantity carried by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    /// Energy in kWh
    Energy,
    /// Volume in m^3
    Volume,
    /// Power in W
    Power,
    /// Volume flow in m^3/h
    Flow,
    /// Flow temperature in degrees Celsius
    FlowTemperature,
    /// Return temperature in degrees Celsius
    ReturnTemperature,
    /// Temperature difference in K
    TemperatureDifference,
    /// Binary error flags
    Status,
}

impl Quantity {
    pub fn unit(&self) -> &'static str {
        match self {
            Quantity::Energy => "kWh",
            Quantity::Volume => "m^3",
            Quantity::Power => "W",
            Quantity::Flow => "m^3/h",
            Quantity::FlowTemperature | Quantity::ReturnTemperature => "°C",
            Quantity::TemperatureDifference => "K",
            Quantity::Status => "",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quantity::Energy => "Energy",
            Quantity::Volume => "Volume",
            Quantity::Power => "Power",
            Quantity::Flow => "Volume Flow",
            Quantity::FlowTemperature => "Flow Temperature",
            Quantity::ReturnTemperature => "Return Temperature",
            Quantity::TemperatureDifference => "Temperature Difference",
            Quantity::Status => "Error Flags",
        };
        f.write_str(name)
    }
}

/// One entry of the VIF classification table.
///
/// A VIF (masked to 7 bits) matches when `vif & mask == bits`. The decimal
/// exponent is `(vif & exponent_mask) - exponent_base`; the scaled value is then
/// divided by `divisor` to reach the published unit.
#[derive(Debug, Clone, Copy)]
pub struct QuantityRule {
    pub mask: u8,
    pub bits: u8,
    pub quantity: Quantity,
    pub exponent_mask: u8,
    pub exponent_base: i8,
    pub divisor: f64,
}

impl QuantityRule {
    const fn new(
        mask: u8,
        bits: u8,
        quantity: Quantity,
        exponent_mask: u8,
        exponent_base: i8,
    ) -> Self {
        QuantityRule {
            mask,
            bits,
            quantity,
            exponent_mask,
            exponent_base,
            divisor: 1.0,
        }
    }

    pub fn matches(&self, vif: u8) -> bool {
        vif & self.mask == self.bits
    }

    pub fn exponent(&self, vif: u8) -> i8 {
        (vif & self.exponent_mask) as i8 - self.exponent_base
    }
}

/// Numeric quantities of the meter, matched in order.
pub const QUANTITY_RULES: [QuantityRule; 7] = [
    // Wh, published as kWh
    QuantityRule {
        divisor: 1000.0,
        ..QuantityRule::new(0x78, 0x00, Quantity::Energy, 0x07, 3)
    },
    QuantityRule::new(0x78, 0x10, Quantity::Volume, 0x07, 6),
    QuantityRule::new(0x78, 0x28, Quantity::Power, 0x07, 3),
    QuantityRule::new(0x78, 0x38, Quantity::Flow, 0x07, 6),
    QuantityRule::new(0x7C, 0x58, Quantity::FlowTemperature, 0x03, 3),
    QuantityRule::new(0x7C, 0x5C, Quantity::ReturnTemperature, 0x03, 3),
    QuantityRule::new(0x7C, 0x60, Quantity::TemperatureDifference, 0x03, 3),
];

/// Classification result of a DIF/VIB pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    Numeric(QuantityRule),
    Status,
}

impl PartialEq for QuantityRule {
    fn eq(&self, other: &Self) -> bool {
        self.mask == other.mask && self.bits == other.bits && self.quantity == other.quantity
    }
}

/// Looks up the quantity of a record.
///
/// Numeric quantities only match instantaneous values (DIF function field 0).
/// The error flags record is recognized by its VIB `FD 17`.
pub fn classify(dif: u8, vib: &[u8]) -> Result<Classification, DecodeError> {
    let vif = vib.first().copied().unwrap_or(0) & MBUS_DIB_VIF_WITHOUT_EXTENSION;
    let function = (dif & MBUS_DATA_RECORD_DIF_MASK_FUNCTION) >> 4;

    if function == 0 {
        if let Some(rule) = QUANTITY_RULES.iter().find(|rule| rule.matches(vif)) {
            return Ok(Classification::Numeric(*rule));
        }
    }

    if vib.len() >= 2
        && vib[0] == MBUS_DIB_VIF_EXTENSION_FD
        && vib[1] == MBUS_DIB_VIFE_ERROR_FLAGS
    {
        return Ok(Classification::Status);
    }

    Err(DecodeError::UnrecognizedQuantity(vif))
}

/// Represents the value of an M-Bus data record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MBusRecordValue {
    Numeric(f64),
    Status(StatusFlags),
}

/// A record with its scale applied.
#[derive(Debug, Clone, PartialEq)]
pub struct MBusRecord {
    /// DIF followed by its extensions
    pub dib: Vec<u8>,
    /// VIF followed by its extensions
    pub vib: Vec<u8>,
    pub quantity: Quantity,
    pub raw: i32,
    pub value: MBusRecordValue,
}

impl MBusRecord {
    pub fn numeric(&self) -> Option<f64> {
        match self.value {
            MBusRecordValue::Numeric(value) => Some(value),
            MBusRecordValue::Status(_) => None,
        }
    }
}

impl fmt::Display for MBusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            MBusRecordValue::Numeric(value) => {
                write!(f, "{}: {} {}", self.quantity, value, self.quantity.unit())
            }
            MBusRecordValue::Status(flags) => write!(f, "{}: {}", self.quantity, flags),
        }
    }
}

/// Reads a DIF or VIF together with its extension bytes.
fn index_field(input: &[u8]) -> Result<(&[u8], &[u8]), DecodeError> {
    let end = input
        .iter()
        .position(|b| b & MBUS_DIB_DIF_EXTENSION_BIT == 0)
        .map(|p| p + 1)
        .ok_or(DecodeError::Truncated {
            needed: input.len() + 1,
            available: input.len(),
        })?;
    Ok((&input[end..], &input[..end]))
}

/// Decodes one record from the front of `input`.
pub fn parse_record(input: &[u8]) -> Result<(&[u8], MBusRecord), DecodeError> {
    let (input, dib) = index_field(input)?;
    let (input, vib) = index_field(input)?;

    let coding = dib[0] & MBUS_DATA_RECORD_DIF_MASK_DATA;
    let width = match coding {
        1..=4 => coding as usize,
        _ => return Err(DecodeError::UnsupportedWidth(coding)),
    };
    if input.len() < width {
        return Err(DecodeError::Truncated {
            needed: width,
            available: input.len(),
        });
    }
    let (input, raw) = decode_int(input, width).map_err(|_| DecodeError::Truncated {
        needed: width,
        available: input.len(),
    })?;

    let (quantity, value) = match classify(dib[0], vib)? {
        Classification::Numeric(rule) => (
            rule.quantity,
            MBusRecordValue::Numeric(convert_value(raw, rule.exponent(vib[0])) / rule.divisor),
        ),
        Classification::Status => (
            Quantity::Status,
            MBusRecordValue::Status(StatusFlags::from_raw(raw)),
        ),
    };

    Ok((
        input,
        MBusRecord {
            dib: dib.to_vec(),
            vib: vib.to_vec(),
            quantity,
            raw,
            value,
        },
    ))
}

/// Lazy iterator over the records of a data area.
///
/// Records are read while more than one byte of the area remains. The first
/// error is yielded once and ends the iteration.
#[derive(Debug, Clone)]
pub struct RecordDecoder<'a> {
    remaining: &'a [u8],
    done: bool,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(records: &'a [u8]) -> Self {
        RecordDecoder {
            remaining: records,
            done: false,
        }
    }
}

impl<'a> Iterator for RecordDecoder<'a> {
    type Item = Result<MBusRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining.len() <= 1 {
            return None;
        }
        match parse_record(self.remaining) {
            Ok((rest, record)) => {
                self.remaining = rest;
                Some(Ok(record))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for RecordDecoder<'_> {}

/// Fixed data header of a variable data structure response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramHeader {
    /// Identification number, `None` if not valid BCD
    pub id: Option<u32>,
    pub manufacturer: String,
    pub version: u8,
    pub medium: u8,
    pub access_number: u8,
    pub status: u8,
    pub signature: u16,
}

fn header(input: &[u8]) -> IResult<&[u8], TelegramHeader> {
    let (input, (id, manufacturer, version, medium, access_number, status, signature)) =
        tuple((take(4usize), take(2usize), be_u8, be_u8, be_u8, be_u8, le_u16))(input)?;
    Ok((
        input,
        TelegramHeader {
            id: decode_bcd(id),
            manufacturer: mbus_decode_manufacturer(manufacturer[0], manufacturer[1]),
            version,
            medium,
            access_number,
            status,
            signature,
        },
    ))
}

impl TelegramHeader {
    /// Parses the 12-byte header, returning it with the record area that follows.
    pub fn parse(data: &[u8]) -> Result<(&[u8], TelegramHeader), DecodeError> {
        header(data).map_err(|_| DecodeError::Truncated {
            needed: MBUS_DATA_VARIABLE_HEADER_LENGTH,
            available: data.len(),
        })
    }
}

/// Result of decoding one data telegram.
#[derive(Debug, Clone, PartialEq)]
pub struct Telegram {
    pub header: TelegramHeader,
    pub records: Vec<MBusRecord>,
    /// Why decoding stopped early, if it did
    pub abort: Option<DecodeError>,
}

impl Telegram {
    /// Scaled value of the last numeric record of `quantity`.
    pub fn value_of(&self, quantity: Quantity) -> Option<f64> {
        self.records
            .iter()
            .rev()
            .filter(|record| record.quantity == quantity)
            .find_map(MBusRecord::numeric)
    }

    /// Error flags of the last status record.
    pub fn status(&self) -> Option<StatusFlags> {
        self.records.iter().rev().find_map(|record| match record.value {
            MBusRecordValue::Status(flags) => Some(flags),
            MBusRecordValue::Numeric(_) => None,
        })
    }
}

/// True if the frame has the shape of the meter's data telegram.
pub fn is_data_telegram(frame: &MBusFrame) -> bool {
    frame.control == MBUS_CONTROL_MASK_RSP_UD
        && frame.control_information == MBUS_CONTROL_INFO_RESP_VARIABLE
}

/// Decodes a validated data telegram.
///
/// Frames that are not RSP_UD with CI=0x72 are rejected as unknown. A record
/// that cannot be decoded stops decoding; it is reported in
/// [`Telegram::abort`] while the records before it are kept.
pub fn decode_telegram(frame: &MBusFrame) -> Result<Telegram, MBusError> {
    if !is_data_telegram(frame) {
        return Err(MBusError::UnknownTelegram {
            control: frame.control,
            control_information: frame.control_information,
        });
    }

    let (records_area, header) = TelegramHeader::parse(&frame.data)?;

    let mut records = Vec::new();
    let mut abort = None;
    for item in RecordDecoder::new(records_area) {
        match item {
            Ok(record) => records.push(record),
            Err(err) => abort = Some(err),
        }
    }

    Ok(Telegram {
        header,
        records,
        abort,
    })
}
