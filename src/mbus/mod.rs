//! The mbus module contains the link layer of the meter reader: frame
//! synchronization and validation, the initialization handshake, timeout
//! supervision and the byte transport.

pub mod frame;
pub mod handshake;
pub mod serial;
pub mod serial_mock;
pub mod supervisor;
pub mod sync;

pub use frame::{calculate_checksum, pack_frame, validate_frame, MBusFrame};
pub use handshake::{Handshake, InitState, Request};
pub use serial::{ByteTransport, SerialConfig, SerialTransport};
pub use serial_mock::MockTransport;
pub use supervisor::LinkSupervisor;
pub use sync::{FeedResult, FrameSynchronizer, RxState};
