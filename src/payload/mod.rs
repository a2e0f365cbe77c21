//! The payload module contains the components responsible for decoding the data
//! area of the heat meter's telegrams: integer and BCD decoding, the record
//! walker with its quantity table, and the error flag bitfield.

pub mod data_encoding;
pub mod record;
pub mod status;

pub use data_encoding::{convert_value, decode_int};
pub use record::{decode_telegram, MBusRecord, MBusRecordValue, Quantity, RecordDecoder, Telegram};
pub use status::StatusFlags;
